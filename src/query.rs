//! Live view of one cached query.
//!
//! Inspired by TanStack Query, a `Query<T>` is what a screen holds on to: it
//! follows one cache entry, so optimistic writes, rollbacks and background
//! refetches all show up in it without the holder doing any fetching itself.
//!
//! # Example
//!
//! ```ignore
//! let gateway = gateway.clone();
//! let mut query = client.observe(QueryKey::order_stats(), move || {
//!     let gateway = gateway.clone();
//!     async move { gateway.fetch_order_stats().await }
//! });
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```

use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::cache::{CacheEntry, FetchStatus, QueryClient, QueryKey, Subscription};

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Nothing cached and nothing in flight
  Idle,
  /// First fetch in progress
  Loading,
  /// Data is available. It may be refetching in the background.
  Success(T),
  /// The fetch failed and there is nothing to show
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Observer of a single cache entry.
///
/// Created by [`QueryClient::observe`]. While it is alive the entry is kept
/// out of garbage collection and is refetched whenever it is invalidated.
pub struct Query<T> {
  client: QueryClient,
  subscription: Subscription,
  state: QueryState<T>,
  fetching: bool,
}

impl<T: DeserializeOwned> Query<T> {
  pub(crate) fn new(client: QueryClient, subscription: Subscription) -> Self {
    let mut query = Self {
      client,
      subscription,
      state: QueryState::Idle,
      fetching: false,
    };
    query.sync();
    query
  }

  pub fn key(&self) -> &QueryKey {
    self.subscription.key()
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Get the data if the query succeeded.
  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// True while any fetch for the key is running, including background
  /// refetches of data that is already shown.
  pub fn is_fetching(&self) -> bool {
    self.fetching
  }

  /// Whether the shown data should be refetched before it is trusted.
  pub fn is_stale(&self) -> bool {
    let stale_time = self.client.policy().stale_time_for(self.key());
    match self.client.store().get(self.key()) {
      Some(entry) => entry.data.is_some() && !entry.is_fresh(stale_time, Utc::now()),
      None => false,
    }
  }

  /// Force a background refetch.
  pub fn refetch(&self) -> bool {
    self.client.refetch(self.key())
  }

  /// Apply any cache changes that happened since the last call.
  ///
  /// Returns `true` if the state may have changed. Call this in your event
  /// loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while self.subscription.try_next().is_some() {
      changed = true;
    }
    if changed {
      self.sync();
    }
    changed
  }

  /// Wait until the entry changes, then apply the change.
  ///
  /// Returns `false` once the cache has gone away.
  pub async fn changed(&mut self) -> bool {
    if self.subscription.next().await.is_none() {
      return false;
    }
    while self.subscription.try_next().is_some() {}
    self.sync();
    true
  }

  fn sync(&mut self) {
    let entry = self
      .client
      .store()
      .get(self.key())
      .unwrap_or_else(CacheEntry::empty);
    self.fetching = entry.status == FetchStatus::Fetching;
    self.state = match entry.decode::<T>() {
      Ok(Some(data)) => QueryState::Success(data),
      Ok(None) => match entry.status {
        FetchStatus::Idle => QueryState::Idle,
        FetchStatus::Fetching => QueryState::Loading,
        FetchStatus::Failed(error) => QueryState::Error(error),
      },
      Err(err) => QueryState::Error(err.to_string()),
    };
  }
}

// Query is not Clone because it owns a subscription. Observe the key again
// to get a second view of the same entry.

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", self.subscription.key())
      .field("state", &self.state)
      .field("fetching", &self.fetching)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CachePolicy, CacheStore, KeyPrefix};
  use crate::error::SyncError;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn client() -> QueryClient {
    QueryClient::new(CacheStore::new(), CachePolicy::default())
  }

  async fn settle<T: DeserializeOwned>(query: &mut Query<T>) {
    tokio::time::timeout(Duration::from_secs(1), async {
      while query.is_fetching() || matches!(query.state(), QueryState::Idle | QueryState::Loading) {
        query.changed().await;
      }
    })
    .await
    .unwrap();
  }

  #[tokio::test]
  async fn test_query_success() {
    let client = client();
    let mut query = client.observe(QueryKey::order_stats(), || async { Ok(vec![1, 2, 3]) });
    assert!(query.is_loading());

    settle(&mut query).await;
    assert!(query.is_success());
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_query_error() {
    let client = client();
    let mut query: Query<i32> = client.observe(QueryKey::order_stats(), || async {
      Err(SyncError::transport("Something went wrong"))
    });

    settle(&mut query).await;
    assert!(query.is_error());
    assert!(query.error().unwrap().contains("Something went wrong"));
  }

  #[tokio::test]
  async fn test_fresh_data_is_not_refetched() {
    let client = QueryClient::new(
      CacheStore::new(),
      CachePolicy::default().with_override(
        KeyPrefix::from(QueryKey::order_stats()),
        chrono::Duration::seconds(60),
      ),
    );
    client.store().set(&QueryKey::order_stats(), &7).unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let query: Query<i32> = client.observe(QueryKey::order_stats(), move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async { Ok(8) }
    });
    assert_eq!(query.data(), Some(&7));
    assert!(!query.is_fetching());
    assert!(!query.is_stale());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_sees_cache_writes() {
    let client = client();
    let key = QueryKey::order_detail("ORD-001");
    let mut query: Query<String> = client.observe(key.clone(), || async { Ok("first".to_string()) });
    settle(&mut query).await;

    client.store().set(&key, &"optimistic").unwrap();
    assert!(query.poll());
    assert_eq!(query.data().map(String::as_str), Some("optimistic"));
    assert!(!query.poll());
  }

  #[tokio::test]
  async fn test_invalidate_refetches_observed_query() {
    let client = client();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = client.observe(QueryKey::order_stats(), move || {
      let n = counter.fetch_add(1, Ordering::SeqCst);
      async move { Ok(n) }
    });
    settle(&mut query).await;
    assert_eq!(query.data(), Some(&0));

    client.invalidate(&KeyPrefix::from(QueryKey::order_stats()));
    query.poll();
    assert!(query.is_stale() || query.is_fetching());
    settle(&mut query).await;
    assert_eq!(query.data(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_drop_releases_interest() {
    let client = client();
    let key = QueryKey::order_stats();
    let mut query = client.observe(key.clone(), || async { Ok(1) });
    settle(&mut query).await;
    assert_eq!(client.store().observers(&key), 1);

    drop(query);
    assert_eq!(client.store().observers(&key), 0);
  }
}
