//! In-memory query cache.
//!
//! This module provides the process-wide cache that readers and the mutation
//! coordinator share:
//! - Entries are addressed by a structured `(kind, operation, params)` key
//! - Invalidation works on key prefixes and refetches what is being observed
//! - Snapshots capture a set of prefixes so an optimistic write can be undone
//! - Idle entries are evicted after a configurable period; nothing is persisted

mod client;
mod entry;
mod key;
mod store;

pub use client::{CachePolicy, QueryClient};
pub use entry::{CacheEntry, CacheResult, CacheSource, FetchStatus};
pub use key::{KeyPrefix, Operation, QueryKey, ResourceKind};
pub use store::{CacheEvent, CacheEventKind, CacheStore, Snapshot, Subscription};
