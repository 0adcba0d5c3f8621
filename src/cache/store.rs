//! In-memory keyed store of query results.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::entry::{CacheEntry, FetchStatus};
use super::key::{KeyPrefix, QueryKey};
use crate::error::Result;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
  /// Data or fetch status changed.
  Updated,
  /// Marked stale; a refetch may follow.
  Invalidated,
  Removed,
}

#[derive(Debug, Clone)]
pub struct CacheEvent {
  pub key: QueryKey,
  pub kind: CacheEventKind,
}

struct Slot {
  key: QueryKey,
  entry: CacheEntry,
  last_used: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
  slots: HashMap<String, Slot>,
  /// Live subscription count per key hash.
  observers: HashMap<String, usize>,
}

/// Process-wide cache of query results.
///
/// Cloning is cheap and every clone refers to the same entries. All reads and
/// writes happen under one lock, so a read-modify-write through
/// [`CacheStore::update`] is atomic with respect to other cache calls.
#[derive(Clone)]
pub struct CacheStore {
  inner: Arc<Mutex<Inner>>,
  events: broadcast::Sender<CacheEvent>,
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      inner: Arc::new(Mutex::new(Inner::default())),
      events,
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    lock_inner(&self.inner)
  }

  fn emit(&self, events: impl IntoIterator<Item = CacheEvent>) {
    for event in events {
      // No receivers is fine.
      let _ = self.events.send(event);
    }
  }

  pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
    let mut inner = self.lock();
    let slot = inner.slots.get_mut(&key.cache_hash())?;
    slot.last_used = Utc::now();
    Some(slot.entry.clone())
  }

  /// Decoded data of an entry, if present.
  pub fn get_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
    match self.get(key) {
      Some(entry) => entry.decode(),
      None => Ok(None),
    }
  }

  /// Overwrite the data of `key` unconditionally.
  pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    self.set_value(key, value);
    Ok(())
  }

  pub fn set_value(&self, key: &QueryKey, value: Value) {
    self.set_entry(key, CacheEntry::with_data(value, Utc::now()));
  }

  /// Replace the whole entry, timestamps and status included.
  pub fn set_entry(&self, key: &QueryKey, entry: CacheEntry) {
    {
      let mut inner = self.lock();
      let now = Utc::now();
      inner.slots.insert(
        key.cache_hash(),
        Slot {
          key: key.clone(),
          entry,
          last_used: now,
        },
      );
    }
    self.emit([CacheEvent {
      key: key.clone(),
      kind: CacheEventKind::Updated,
    }]);
  }

  /// Update the fetch status, creating an empty entry if needed.
  pub fn set_status(&self, key: &QueryKey, status: FetchStatus) {
    {
      let mut inner = self.lock();
      let slot = inner
        .slots
        .entry(key.cache_hash())
        .or_insert_with(|| Slot {
          key: key.clone(),
          entry: CacheEntry::empty(),
          last_used: Utc::now(),
        });
      slot.entry.status = status;
    }
    self.emit([CacheEvent {
      key: key.clone(),
      kind: CacheEventKind::Updated,
    }]);
  }

  /// Rewrite the data of every entry under `prefix` that holds a `T`.
  ///
  /// Entries without data are skipped. Returns the number of rewritten
  /// entries. Timestamps and status are left as they are.
  pub fn update<T, F>(&self, prefix: &KeyPrefix, mut f: F) -> Result<usize>
  where
    T: Serialize + DeserializeOwned,
    F: FnMut(&QueryKey, &mut T),
  {
    let mut touched = Vec::new();
    {
      let mut inner = self.lock();
      for slot in inner.slots.values_mut() {
        if !prefix.matches(&slot.key) {
          continue;
        }
        let Some(mut data) = slot.entry.decode::<T>()? else {
          continue;
        };
        f(&slot.key, &mut data);
        slot.entry.data = Some(serde_json::to_value(&data)?);
        slot.last_used = Utc::now();
        touched.push(CacheEvent {
          key: slot.key.clone(),
          kind: CacheEventKind::Updated,
        });
      }
    }
    let count = touched.len();
    self.emit(touched);
    Ok(count)
  }

  pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
    let removed = self.lock().slots.remove(&key.cache_hash());
    if removed.is_some() {
      self.emit([CacheEvent {
        key: key.clone(),
        kind: CacheEventKind::Removed,
      }]);
    }
    removed.map(|slot| slot.entry)
  }

  pub fn keys(&self, prefix: &KeyPrefix) -> Vec<QueryKey> {
    self
      .lock()
      .slots
      .values()
      .filter(|slot| prefix.matches(&slot.key))
      .map(|slot| slot.key.clone())
      .collect()
  }

  /// All entries under `prefix`, ordered by key for stable comparison.
  pub fn entries(&self, prefix: &KeyPrefix) -> Vec<(QueryKey, CacheEntry)> {
    let mut entries: Vec<_> = self
      .lock()
      .slots
      .values()
      .filter(|slot| prefix.matches(&slot.key))
      .map(|slot| (slot.key.clone(), slot.entry.clone()))
      .collect();
    entries.sort_by_key(|(key, _)| key.description());
    entries
  }

  /// Mark every entry under `prefix` stale. Returns the affected keys.
  pub fn invalidate(&self, prefix: &KeyPrefix) -> Vec<QueryKey> {
    let keys: Vec<QueryKey> = {
      let mut inner = self.lock();
      inner
        .slots
        .values_mut()
        .filter(|slot| prefix.matches(&slot.key))
        .map(|slot| {
          slot.entry.stale = true;
          slot.key.clone()
        })
        .collect()
    };
    debug!(prefix = %prefix, count = keys.len(), "invalidated cache entries");
    self.emit(keys.iter().map(|key| CacheEvent {
      key: key.clone(),
      kind: CacheEventKind::Invalidated,
    }));
    keys
  }

  /// Capture every entry under the given prefixes.
  pub fn snapshot(&self, prefixes: &[KeyPrefix]) -> Snapshot {
    let inner = self.lock();
    let entries = inner
      .slots
      .values()
      .filter(|slot| prefixes.iter().any(|p| p.matches(&slot.key)))
      .map(|slot| (slot.key.clone(), slot.entry.clone()))
      .collect();
    Snapshot {
      prefixes: prefixes.to_vec(),
      entries,
    }
  }

  /// Put the snapshotted prefixes back exactly as captured.
  ///
  /// Entries that appeared under the prefixes after the snapshot was taken
  /// are removed.
  pub fn restore(&self, snapshot: Snapshot) {
    let mut events = Vec::new();
    {
      let mut inner = self.lock();
      let captured: HashSet<String> = snapshot
        .entries
        .iter()
        .map(|(key, _)| key.cache_hash())
        .collect();

      let added: Vec<String> = inner
        .slots
        .iter()
        .filter(|(hash, slot)| {
          !captured.contains(*hash) && snapshot.prefixes.iter().any(|p| p.matches(&slot.key))
        })
        .map(|(hash, _)| hash.clone())
        .collect();
      for hash in added {
        if let Some(slot) = inner.slots.remove(&hash) {
          events.push(CacheEvent {
            key: slot.key,
            kind: CacheEventKind::Removed,
          });
        }
      }

      let now = Utc::now();
      for (key, entry) in snapshot.entries {
        events.push(CacheEvent {
          key: key.clone(),
          kind: CacheEventKind::Updated,
        });
        inner.slots.insert(
          key.cache_hash(),
          Slot {
            key,
            entry,
            last_used: now,
          },
        );
      }
    }
    self.emit(events);
  }

  /// Watch one key for changes.
  pub fn subscribe(&self, key: &QueryKey) -> Subscription {
    *self.lock().observers.entry(key.cache_hash()).or_insert(0) += 1;
    Subscription {
      key: key.clone(),
      hash: key.cache_hash(),
      rx: self.events.subscribe(),
      inner: Arc::downgrade(&self.inner),
    }
  }

  pub fn observers(&self, key: &QueryKey) -> usize {
    self
      .lock()
      .observers
      .get(&key.cache_hash())
      .copied()
      .unwrap_or(0)
  }

  /// Hashes of every key with at least one live subscription.
  pub(crate) fn observed_hashes(&self) -> HashSet<String> {
    self.lock().observers.keys().cloned().collect()
  }

  /// Evict entries nobody observes that have been idle longer than `gc_time`.
  pub fn collect_garbage(&self, gc_time: Duration) -> usize {
    self.collect_garbage_at(gc_time, Utc::now())
  }

  fn collect_garbage_at(&self, gc_time: Duration, now: DateTime<Utc>) -> usize {
    let mut evicted = Vec::new();
    {
      let mut inner = self.lock();
      let Inner { slots, observers } = &mut *inner;
      slots.retain(|hash, slot| {
        let keep = observers.contains_key(hash) || now - slot.last_used <= gc_time;
        if !keep {
          evicted.push(CacheEvent {
            key: slot.key.clone(),
            kind: CacheEventKind::Removed,
          });
        }
        keep
      });
    }
    let count = evicted.len();
    if count > 0 {
      debug!(count, "evicted idle cache entries");
    }
    self.emit(evicted);
    count
  }

  /// Drop every entry. Subscriptions stay valid.
  pub fn clear(&self) {
    let removed: Vec<QueryKey> = {
      let mut inner = self.lock();
      inner.slots.drain().map(|(_, slot)| slot.key).collect()
    };
    self.emit(removed.into_iter().map(|key| CacheEvent {
      key,
      kind: CacheEventKind::Removed,
    }));
  }

  pub fn len(&self) -> usize {
    self.lock().slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
  // Cache operations never leave an entry half-written, so a poisoned lock
  // still guards consistent data.
  inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entries captured before an optimistic write, used to roll it back.
#[derive(Debug, Clone)]
pub struct Snapshot {
  prefixes: Vec<KeyPrefix>,
  entries: Vec<(QueryKey, CacheEntry)>,
}

impl Snapshot {
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// A live interest in one key. Dropping it releases the interest, which
/// makes the entry eligible for garbage collection again.
pub struct Subscription {
  key: QueryKey,
  hash: String,
  rx: broadcast::Receiver<CacheEvent>,
  inner: Weak<Mutex<Inner>>,
}

impl Subscription {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Next event for this key without waiting.
  pub fn try_next(&mut self) -> Option<CacheEventKind> {
    loop {
      match self.rx.try_recv() {
        Ok(event) if event.key == self.key => return Some(event.kind),
        Ok(_) => continue,
        // Missed events; the entry may have changed in any way.
        Err(broadcast::error::TryRecvError::Lagged(_)) => return Some(CacheEventKind::Updated),
        Err(_) => return None,
      }
    }
  }

  /// Wait for the next event for this key. `None` once the store is gone.
  pub async fn next(&mut self) -> Option<CacheEventKind> {
    loop {
      match self.rx.recv().await {
        Ok(event) if event.key == self.key => return Some(event.kind),
        Ok(_) => continue,
        Err(broadcast::error::RecvError::Lagged(_)) => return Some(CacheEventKind::Updated),
        Err(broadcast::error::RecvError::Closed) => return None,
      }
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    let Some(inner) = self.inner.upgrade() else {
      return;
    };
    let mut inner = lock_inner(&inner);
    let remaining = match inner.observers.get_mut(&self.hash) {
      Some(count) => {
        *count = count.saturating_sub(1);
        *count
      }
      None => return,
    };
    if remaining == 0 {
      inner.observers.remove(&self.hash);
      if let Some(slot) = inner.slots.get_mut(&self.hash) {
        slot.last_used = Utc::now();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::key::{Operation, ResourceKind};
  use crate::model::{OrderFilter, OrderStatus};
  use serde_json::json;

  fn pending_list() -> QueryKey {
    QueryKey::order_list(&OrderFilter::status(OrderStatus::Pending))
  }

  #[test]
  fn test_set_and_get() {
    let store = CacheStore::new();
    let key = QueryKey::order_detail("ORD-001");
    assert!(store.get(&key).is_none());

    store.set(&key, &json!({"id": "ORD-001"})).unwrap();
    let entry = store.get(&key).unwrap();
    assert_eq!(entry.data, Some(json!({"id": "ORD-001"})));
    assert!(!entry.stale);
    assert_eq!(entry.status, FetchStatus::Idle);
  }

  #[test]
  fn test_invalidate_marks_only_matching_entries() {
    let store = CacheStore::new();
    store.set(&pending_list(), &json!([])).unwrap();
    store.set(&QueryKey::order_detail("ORD-001"), &json!({})).unwrap();
    store.set(&QueryKey::task_list("ORD-001"), &json!([])).unwrap();

    let keys = store.invalidate(&KeyPrefix::Kind(ResourceKind::Orders));
    assert_eq!(keys.len(), 2);
    assert!(store.get(&pending_list()).unwrap().stale);
    assert!(store.get(&QueryKey::order_detail("ORD-001")).unwrap().stale);
    assert!(!store.get(&QueryKey::task_list("ORD-001")).unwrap().stale);

    // The next write makes it fresh again.
    store.set(&pending_list(), &json!([1])).unwrap();
    assert!(!store.get(&pending_list()).unwrap().stale);
  }

  #[test]
  fn test_update_rewrites_every_matching_list() {
    let store = CacheStore::new();
    let all = QueryKey::order_list(&OrderFilter::default());
    store.set(&all, &vec![1, 2, 3]).unwrap();
    store.set(&pending_list(), &vec![2]).unwrap();
    store.set(&QueryKey::order_detail("x"), &7).unwrap();

    let count = store
      .update::<Vec<i32>, _>(
        &KeyPrefix::Operation(ResourceKind::Orders, Operation::List),
        |_, list| list.retain(|n| *n != 2),
      )
      .unwrap();
    assert_eq!(count, 2);
    assert_eq!(store.get_data::<Vec<i32>>(&all).unwrap(), Some(vec![1, 3]));
    assert_eq!(store.get_data::<Vec<i32>>(&pending_list()).unwrap(), Some(vec![]));
    assert_eq!(store.get_data::<i32>(&QueryKey::order_detail("x")).unwrap(), Some(7));
  }

  #[test]
  fn test_snapshot_restore_is_exact() {
    let store = CacheStore::new();
    let prefix = KeyPrefix::Kind(ResourceKind::Orders);
    store.set(&pending_list(), &vec![1, 2]).unwrap();
    store.set(&QueryKey::order_detail("ORD-001"), &1).unwrap();
    store.invalidate(&KeyPrefix::from(pending_list()));
    let before = store.entries(&prefix);

    let snapshot = store.snapshot(&[prefix.clone()]);
    assert_eq!(snapshot.len(), 2);

    store.set(&pending_list(), &vec![9]).unwrap();
    store.remove(&QueryKey::order_detail("ORD-001"));
    store.set(&QueryKey::order_detail("temp-1"), &0).unwrap();

    store.restore(snapshot);
    assert_eq!(store.entries(&prefix), before);
  }

  #[test]
  fn test_restore_leaves_other_prefixes_alone() {
    let store = CacheStore::new();
    let tasks = QueryKey::task_list("ORD-001");
    let snapshot = store.snapshot(&[KeyPrefix::Kind(ResourceKind::Orders)]);
    store.set(&tasks, &vec![1]).unwrap();
    store.restore(snapshot);
    assert!(store.get(&tasks).is_some());
  }

  #[tokio::test]
  async fn test_subscription_sees_only_its_key() {
    let store = CacheStore::new();
    let key = QueryKey::order_detail("ORD-001");
    let mut sub = store.subscribe(&key);

    store.set(&QueryKey::order_detail("ORD-002"), &2).unwrap();
    assert!(sub.try_next().is_none());

    store.set(&key, &1).unwrap();
    assert_eq!(sub.next().await, Some(CacheEventKind::Updated));

    store.invalidate(&KeyPrefix::from(key.clone()));
    assert_eq!(sub.try_next(), Some(CacheEventKind::Invalidated));
  }

  #[test]
  fn test_garbage_collection_spares_observed_entries() {
    let store = CacheStore::new();
    let watched = QueryKey::order_detail("ORD-001");
    let idle = QueryKey::order_detail("ORD-002");
    store.set(&watched, &1).unwrap();
    store.set(&idle, &2).unwrap();
    let sub = store.subscribe(&watched);
    assert_eq!(store.observers(&watched), 1);

    let later = Utc::now() + Duration::minutes(11);
    assert_eq!(store.collect_garbage_at(Duration::minutes(10), later), 1);
    assert!(store.get(&watched).is_some());
    assert!(store.get(&idle).is_none());

    drop(sub);
    assert_eq!(store.observers(&watched), 0);
    let much_later = Utc::now() + Duration::minutes(21);
    assert_eq!(store.collect_garbage_at(Duration::minutes(10), much_later), 1);
    assert!(store.is_empty());
  }

  #[test]
  fn test_recent_entries_survive_collection() {
    let store = CacheStore::new();
    store.set(&QueryKey::order_stats(), &0).unwrap();
    assert_eq!(store.collect_garbage(Duration::minutes(10)), 0);
    assert_eq!(store.len(), 1);
  }
}
