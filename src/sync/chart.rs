use std::sync::Arc;

use super::Dashboard;
use crate::cache::{CacheResult, QueryKey};
use crate::error::Result;
use crate::gateway::ChartGateway;
use crate::model::ChartPoint;
use crate::query::Query;

impl<G: ChartGateway> Dashboard<G> {
  /// The week shown on the dashboard chart. Read-only.
  pub async fn weekly_chart(&self) -> Result<CacheResult<Vec<ChartPoint>>> {
    self
      .client
      .fetch(&QueryKey::chart_data(), || self.gateway.fetch_chart_data())
      .await
  }

  pub fn observe_weekly_chart(&self) -> Query<Vec<ChartPoint>> {
    let gateway = Arc::clone(&self.gateway);
    self.client.observe(QueryKey::chart_data(), move || {
      let gateway = Arc::clone(&gateway);
      async move { gateway.fetch_chart_data().await }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, CacheStore, QueryClient};
  use crate::config::CacheConfig;
  use crate::notify::Notifier;
  use crate::gateway::fake::FakeBackend;
  use crate::sync::testing::dashboard;

  #[tokio::test]
  async fn test_empty_backend_serves_default_week() {
    let (dashboard, _rx) = dashboard(FakeBackend::new());
    let chart = dashboard.weekly_chart().await.unwrap();
    assert_eq!(chart.source, CacheSource::Network);
    assert_eq!(chart.data, ChartPoint::default_week());
  }

  #[tokio::test]
  async fn test_chart_is_served_from_cache_while_fresh() {
    let mut week = ChartPoint::default_week();
    week.extend(ChartPoint::default_week());
    let client = QueryClient::new(CacheStore::new(), CacheConfig::default().policy());
    let dashboard = Dashboard::new(
      Arc::new(FakeBackend::new().with_chart(week)),
      client,
      Notifier::disabled(),
    );

    let first = dashboard.weekly_chart().await.unwrap();
    assert_eq!(first.data.len(), 7);
    let second = dashboard.weekly_chart().await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(dashboard.gateway().calls(), vec!["fetch_chart_data"]);
  }

  #[tokio::test]
  async fn test_observe_chart_loads() {
    let (dashboard, _rx) = dashboard(FakeBackend::new());
    let mut query = dashboard.observe_weekly_chart();
    while !query.is_success() {
      query.changed().await;
    }
    assert_eq!(query.data().map(Vec::len), Some(7));
  }
}
