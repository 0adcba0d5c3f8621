//! Cache entries and the result type returned by cached fetches.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// In-flight / error state of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
  Idle,
  Fetching,
  /// The last fetch failed; any data is from an earlier success.
  Failed(String),
}

/// The last known value of one query.
///
/// Values are held as JSON so a single store can hold every resource type;
/// callers decode with [`CacheEntry::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub data: Option<Value>,
  pub fetched_at: Option<DateTime<Utc>>,
  /// Set by invalidation; cleared by the next write.
  pub stale: bool,
  pub status: FetchStatus,
}

impl CacheEntry {
  pub fn empty() -> Self {
    Self {
      data: None,
      fetched_at: None,
      stale: false,
      status: FetchStatus::Idle,
    }
  }

  pub fn with_data(data: Value, now: DateTime<Utc>) -> Self {
    Self {
      data: Some(data),
      fetched_at: Some(now),
      stale: false,
      status: FetchStatus::Idle,
    }
  }

  pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
    match &self.data {
      Some(value) => Ok(Some(T::deserialize(value)?)),
      None => Ok(None),
    }
  }

  /// Whether the data can be served without going to the network.
  pub fn is_fresh(&self, stale_time: Duration, now: DateTime<Utc>) -> bool {
    match (&self.data, self.fetched_at) {
      (Some(_), Some(fetched_at)) => !self.stale && now - fetched_at <= stale_time,
      _ => false,
    }
  }
}

/// Result from a cached fetch, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at,
    }
  }

  /// Network failed; serving the last known value.
  pub fn offline(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  Cache,
  /// Network unavailable, serving stale cached data
  Offline,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_freshness() {
    let now = Utc::now();
    let entry = CacheEntry::with_data(json!([1, 2]), now - Duration::seconds(10));
    assert!(entry.is_fresh(Duration::seconds(30), now));
    assert!(!entry.is_fresh(Duration::seconds(5), now));

    let stale = CacheEntry {
      stale: true,
      ..entry.clone()
    };
    assert!(!stale.is_fresh(Duration::seconds(30), now));
    assert!(!CacheEntry::empty().is_fresh(Duration::seconds(30), now));
  }

  #[test]
  fn test_decode() {
    let entry = CacheEntry::with_data(json!([1, 2, 3]), Utc::now());
    assert_eq!(entry.decode::<Vec<u32>>().unwrap(), Some(vec![1, 2, 3]));
    assert!(entry.decode::<String>().is_err());
    assert_eq!(CacheEntry::empty().decode::<Vec<u32>>().unwrap(), None);
  }
}
