//! Query client: fetch policy, background refetch and lifecycle on top of the
//! cache store.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use super::entry::{CacheResult, FetchStatus};
use super::key::{KeyPrefix, QueryKey};
use super::store::CacheStore;
use crate::error::{Result, SyncError};
use crate::query::Query;

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Re-runs the fetch for one key, producing the serialized value.
type Refetcher = Arc<dyn Fn() -> BoxFuture<Value> + Send + Sync>;

/// How long fetched data stays fresh, and how long unobserved data is kept.
#[derive(Debug, Clone)]
pub struct CachePolicy {
  pub stale_time: Duration,
  pub gc_time: Duration,
  /// Per-prefix stale times; the first matching prefix wins.
  pub overrides: Vec<(KeyPrefix, Duration)>,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      stale_time: Duration::zero(),
      gc_time: Duration::minutes(10),
      overrides: Vec::new(),
    }
  }
}

impl CachePolicy {
  pub fn with_override(mut self, prefix: KeyPrefix, stale_time: Duration) -> Self {
    self.overrides.push((prefix, stale_time));
    self
  }

  pub fn stale_time_for(&self, key: &QueryKey) -> Duration {
    self
      .overrides
      .iter()
      .find(|(prefix, _)| prefix.matches(key))
      .map(|(_, stale)| *stale)
      .unwrap_or(self.stale_time)
  }
}

struct InFlight {
  id: u64,
  key: QueryKey,
  handle: AbortHandle,
}

#[derive(Default)]
struct ClientInner {
  refetchers: Mutex<HashMap<String, Refetcher>>,
  in_flight: Mutex<HashMap<String, InFlight>>,
  gc_task: Mutex<Option<JoinHandle<()>>>,
  next_fetch_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point to the cache for readers.
///
/// Constructed once at startup and handed to everything that needs the
/// cache; [`QueryClient::shutdown`] tears it down.
#[derive(Clone)]
pub struct QueryClient {
  store: CacheStore,
  policy: Arc<CachePolicy>,
  inner: Arc<ClientInner>,
}

impl QueryClient {
  pub fn new(store: CacheStore, policy: CachePolicy) -> Self {
    Self {
      store,
      policy: Arc::new(policy),
      inner: Arc::new(ClientInner::default()),
    }
  }

  pub fn store(&self) -> &CacheStore {
    &self.store
  }

  pub fn policy(&self) -> &CachePolicy {
    &self.policy
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh cached data is returned immediately
  /// 2. Stale or missing data is fetched from the network and cached
  /// 3. On a transport failure, stale cached data is returned (offline mode)
  pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<CacheResult<T>>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let cached = self.store.get(key);
    let stale_time = self.policy.stale_time_for(key);

    if let Some(entry) = &cached {
      if entry.is_fresh(stale_time, Utc::now()) {
        if let Some(data) = entry.decode()? {
          return Ok(CacheResult::from_cache(data, entry.fetched_at));
        }
      }
    }

    self.store.set_status(key, FetchStatus::Fetching);
    match fetcher().await {
      Ok(data) => {
        self.store.set(key, &data)?;
        Ok(CacheResult::from_network(data))
      }
      Err(err) => {
        self.store.set_status(key, FetchStatus::Failed(err.to_string()));
        let offline = match (&err, &cached) {
          (SyncError::Transport { .. }, Some(entry)) => entry
            .decode::<T>()?
            .map(|data| CacheResult::offline(data, entry.fetched_at)),
          _ => None,
        };
        match offline {
          Some(result) => {
            warn!(key = %key, error = %err, "fetch failed, serving cached data");
            Ok(result)
          }
          None => Err(err),
        }
      }
    }
  }

  /// Subscribe to a query and keep it fetched.
  ///
  /// The fetcher is remembered so that invalidating the key while the
  /// returned [`Query`] is alive refetches it in the background.
  pub fn observe<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Query<T>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let refetcher: Refetcher = Arc::new(move || {
      let fut = fetcher();
      Box::pin(async move {
        let data = fut.await?;
        Ok(serde_json::to_value(&data)?)
      })
    });
    lock(&self.inner.refetchers).insert(key.cache_hash(), refetcher);

    let subscription = self.store.subscribe(&key);
    let fresh = self
      .store
      .get(&key)
      .is_some_and(|entry| entry.is_fresh(self.policy.stale_time_for(&key), Utc::now()));
    if !fresh {
      self.refetch(&key);
    }
    Query::new(self.clone(), subscription)
  }

  /// Start a background refetch of `key` if a fetcher is registered for it.
  ///
  /// A refetch already running for the key is aborted first.
  pub fn refetch(&self, key: &QueryKey) -> bool {
    let Some(refetcher) = lock(&self.inner.refetchers).get(&key.cache_hash()).cloned() else {
      return false;
    };
    if tokio::runtime::Handle::try_current().is_err() {
      return false;
    }

    let hash = key.cache_hash();
    let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
    let store = self.store.clone();
    let inner = Arc::clone(&self.inner);
    let task_key = key.clone();
    let task_hash = hash.clone();

    self.store.set_status(key, FetchStatus::Fetching);
    // Held across the spawn so the task cannot finish before it is registered.
    let mut in_flight = lock(&self.inner.in_flight);
    let handle = tokio::spawn(async move {
      match refetcher().await {
        Ok(value) => store.set_value(&task_key, value),
        Err(err) => {
          warn!(key = %task_key, error = %err, "background refetch failed");
          store.set_status(&task_key, FetchStatus::Failed(err.to_string()));
        }
      }
      let mut in_flight = lock(&inner.in_flight);
      if in_flight.get(&task_hash).is_some_and(|f| f.id == id) {
        in_flight.remove(&task_hash);
      }
    });
    let previous = in_flight.insert(
      hash,
      InFlight {
        id,
        key: key.clone(),
        handle: handle.abort_handle(),
      },
    );
    drop(in_flight);
    if let Some(previous) = previous {
      previous.handle.abort();
    }
    debug!(key = %key, "refetching");
    true
  }

  /// Mark entries stale and refetch the ones that are being observed.
  pub fn invalidate(&self, prefix: &KeyPrefix) -> Vec<QueryKey> {
    let keys = self.store.invalidate(prefix);
    for key in &keys {
      if self.store.observers(key) > 0 {
        self.refetch(key);
      }
    }
    keys
  }

  /// Abort background refetches under `prefix` so they cannot overwrite
  /// what the caller is about to write. Returns the keys whose refetch was
  /// aborted.
  pub fn cancel(&self, prefix: &KeyPrefix) -> Vec<QueryKey> {
    let cancelled: Vec<InFlight> = {
      let mut in_flight = lock(&self.inner.in_flight);
      let hashes: Vec<String> = in_flight
        .iter()
        .filter(|(_, f)| prefix.matches(&f.key))
        .map(|(hash, _)| hash.clone())
        .collect();
      hashes
        .into_iter()
        .filter_map(|hash| in_flight.remove(&hash))
        .collect()
    };
    cancelled
      .into_iter()
      .map(|fetch| {
        fetch.handle.abort();
        self.store.set_status(&fetch.key, FetchStatus::Idle);
        fetch.key
      })
      .collect()
  }

  /// Evict idle entries every `interval` until shutdown.
  pub fn spawn_gc(&self, interval: std::time::Duration) {
    let client = self.clone();
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        client.collect_garbage();
      }
    });
    if let Some(previous) = lock(&self.inner.gc_task).replace(handle) {
      previous.abort();
    }
  }

  /// Evict idle entries now and forget fetchers nobody observes.
  pub fn collect_garbage(&self) -> usize {
    let evicted = self.store.collect_garbage(self.policy.gc_time);
    let observed = self.store.observed_hashes();
    lock(&self.inner.refetchers).retain(|hash, _| observed.contains(hash));
    evicted
  }

  /// Stop background work and drop all cached data.
  pub fn shutdown(&self) {
    if let Some(handle) = lock(&self.inner.gc_task).take() {
      handle.abort();
    }
    for (_, fetch) in lock(&self.inner.in_flight).drain() {
      fetch.handle.abort();
    }
    lock(&self.inner.refetchers).clear();
    self.store.clear();
    debug!("query client shut down");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, ResourceKind};
  use std::sync::atomic::AtomicUsize;

  fn client(stale_time: Duration) -> QueryClient {
    let policy = CachePolicy {
      stale_time,
      ..CachePolicy::default()
    };
    QueryClient::new(CacheStore::new(), policy)
  }

  fn key() -> QueryKey {
    QueryKey::order_detail("ORD-001")
  }

  #[tokio::test]
  async fn test_fresh_data_is_served_from_cache() {
    let client = client(Duration::minutes(1));
    let calls = AtomicUsize::new(0);
    let fetch = || async {
      calls.fetch_add(1, Ordering::SeqCst);
      Ok::<i32, SyncError>(7)
    };

    let first = client.fetch(&key(), fetch).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    let second = client.fetch(&key(), fetch).await.unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data, 7);
    assert!(second.cached_at.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    client.invalidate(&KeyPrefix::Kind(ResourceKind::Orders));
    client.fetch(&key(), fetch).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_transport_failure_falls_back_to_cached_data() {
    let client = client(Duration::zero());
    client
      .fetch(&key(), || async { Ok::<i32, SyncError>(7) })
      .await
      .unwrap();

    let result = client
      .fetch(&key(), || async {
        Err::<i32, _>(SyncError::transport("network unreachable"))
      })
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, 7);
    assert!(matches!(
      client.store().get(&key()).unwrap().status,
      FetchStatus::Failed(_)
    ));

    let err = client
      .fetch(&key(), || async {
        Err::<i32, _>(SyncError::not_found(ResourceKind::Orders, "ORD-001"))
      })
      .await
      .unwrap_err();
    assert!(err.is_not_found());
  }

  #[tokio::test]
  async fn test_transport_failure_without_cache_is_an_error() {
    let client = client(Duration::zero());
    let err = client
      .fetch(&key(), || async { Err::<i32, _>(SyncError::transport("down")) })
      .await
      .unwrap_err();
    assert!(matches!(err, SyncError::Transport { .. }));
  }

  #[tokio::test]
  async fn test_cancel_aborts_background_refetch() {
    let client = client(Duration::zero());
    let _query = client.observe(key(), || std::future::pending::<Result<i32>>());
    assert_eq!(client.store().get(&key()).unwrap().status, FetchStatus::Fetching);

    assert!(client.cancel(&KeyPrefix::Kind(ResourceKind::Users)).is_empty());
    assert_eq!(client.cancel(&KeyPrefix::Kind(ResourceKind::Orders)), vec![key()]);
    assert_eq!(client.store().get(&key()).unwrap().status, FetchStatus::Idle);
  }

  #[tokio::test]
  async fn test_invalidate_refetches_only_observed_keys() {
    let client = client(Duration::zero());
    client.store().set(&key(), &1).unwrap();
    client
      .store()
      .set(&QueryKey::order_detail("ORD-002"), &2)
      .unwrap();

    let _query = client.observe(key(), || std::future::pending::<Result<i32>>());
    client.cancel(&KeyPrefix::Exact(key()));

    let keys = client.invalidate(&KeyPrefix::Kind(ResourceKind::Orders));
    assert_eq!(keys.len(), 2);
    assert_eq!(client.store().get(&key()).unwrap().status, FetchStatus::Fetching);
    let other = client.store().get(&QueryKey::order_detail("ORD-002")).unwrap();
    assert_eq!(other.status, FetchStatus::Idle);
    assert!(other.stale);
  }

  #[tokio::test]
  async fn test_shutdown_drops_everything() {
    let client = client(Duration::zero());
    client.spawn_gc(std::time::Duration::from_secs(60));
    client.store().set(&key(), &1).unwrap();
    let _query = client.observe(key(), || std::future::pending::<Result<i32>>());

    client.shutdown();
    assert!(client.store().is_empty());
    assert!(!client.refetch(&key()));
  }
}
