use crate::cache::ResourceKind;
use crate::error::Result;
use crate::model::rows::{decode_rows, DbChartPoint};
use crate::model::ChartPoint;

use super::rest::{Params, RestGateway};
use super::ChartGateway;

const TABLE: &str = "chart_data";

/// Points shown on the weekly chart.
const WEEK: usize = 7;

impl ChartGateway for RestGateway {
  async fn fetch_chart_data(&self) -> Result<Vec<ChartPoint>> {
    let params = Params::new()
      .select("name,average,today")
      .order("date", true)
      .limit(WEEK);
    let rows = self
      .select(TABLE, &params, ResourceKind::ChartData)
      .await?;
    if rows.is_empty() {
      return Ok(ChartPoint::default_week());
    }
    decode_rows::<DbChartPoint, ChartPoint>(rows, "chart data")
  }
}
