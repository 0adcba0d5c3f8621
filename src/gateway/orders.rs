use crate::cache::ResourceKind;
use crate::error::Result;
use crate::model::rows::{
  decode_row, decode_rows, DbOrder, DbOrderInsert, DbOrderTotals, DbOrderUpdate, OrderTotals,
};
use crate::model::{CreateOrder, Order, OrderFilter, OrderPatch, OrderStats};

use super::rest::{Params, RestGateway};
use super::OrdersGateway;

const TABLE: &str = "orders";
const KIND: ResourceKind = ResourceKind::Orders;

/// Columns searched by the free-text order filter.
const SEARCH_COLUMNS: [&str; 3] = ["client_name", "project_type", "id"];

impl OrdersGateway for RestGateway {
  async fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
    let filter = filter.normalized();
    let mut params = Params::new().select("*").order("created_at", false);
    if let Some(status) = filter.status {
      params = params.eq("status", status);
    }
    if let Some(term) = &filter.search {
      params = params.search(&SEARCH_COLUMNS, term);
    }
    let rows = self.select(TABLE, &params, KIND).await?;
    decode_rows::<DbOrder, Order>(rows, "order")
  }

  async fn fetch_order(&self, id: &str) -> Result<Order> {
    let params = Params::new().select("*").eq("id", id);
    let row = self.select_one(TABLE, &params, KIND, id).await?;
    decode_row::<DbOrder, Order>(row, "order detail")
  }

  async fn create_order(&self, input: &CreateOrder) -> Result<Order> {
    input.validate()?;
    let row = self
      .insert(TABLE, &DbOrderInsert::from(input), KIND)
      .await?;
    decode_row::<DbOrder, Order>(row, "created order")
  }

  async fn update_order(&self, patch: &OrderPatch) -> Result<Order> {
    patch.validate()?;
    let params = Params::new().eq("id", &patch.id);
    let row = self
      .update(TABLE, &params, &DbOrderUpdate::from(patch), KIND, &patch.id)
      .await?;
    decode_row::<DbOrder, Order>(row, "updated order")
  }

  async fn delete_order(&self, id: &str) -> Result<()> {
    self
      .delete(TABLE, &Params::new().eq("id", id), KIND, id)
      .await
  }

  async fn fetch_recent_orders(&self, limit: usize) -> Result<Vec<Order>> {
    let params = Params::new()
      .select("*")
      .order("deadline", true)
      .limit(limit);
    let rows = self.select(TABLE, &params, KIND).await?;
    decode_rows::<DbOrder, Order>(rows, "recent order")
  }

  async fn fetch_order_stats(&self) -> Result<OrderStats> {
    let params = Params::new().select("status,amount");
    let rows = self.select(TABLE, &params, KIND).await?;
    let totals = decode_rows::<DbOrderTotals, OrderTotals>(rows, "order totals")?;
    Ok(OrderStats::tally(
      totals.into_iter().map(|t| (t.status, t.amount)),
    ))
  }
}
