//! Structured query keys and key prefixes.

use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::model::{OrderFilter, TaskFilter, UserFilter};

/// Category of backend-managed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
  Orders,
  Tasks,
  Users,
  ChartData,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Orders => "orders",
      Self::Tasks => "tasks",
      Self::Users => "users",
      Self::ChartData => "chart_data",
    }
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Orders => "order",
      Self::Tasks => "task",
      Self::Users => "user",
      Self::ChartData => "chart data",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  List,
  Detail,
  Recent,
  Stats,
}

impl Operation {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::List => "list",
      Self::Detail => "detail",
      Self::Recent => "recent",
      Self::Stats => "stats",
    }
  }
}

/// Cache key: `(resource kind, operation, params)`.
///
/// Params are the canonical JSON form of whatever parameterizes the query
/// (a filter, an id, a limit). Two keys are the same entry exactly when all
/// three parts match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  kind: ResourceKind,
  op: Operation,
  params: String,
}

impl QueryKey {
  /// Keys are only built through the constructors below, whose params are
  /// filters, ids, limits or `()`: none of them can fail to serialize.
  fn new<P: Serialize>(kind: ResourceKind, op: Operation, params: &P) -> Self {
    let params = serde_json::to_string(params);
    debug_assert!(params.is_ok(), "query params must serialize");
    Self {
      kind,
      op,
      params: params.unwrap_or_default(),
    }
  }

  pub fn order_list(filter: &OrderFilter) -> Self {
    Self::new(ResourceKind::Orders, Operation::List, &filter.normalized())
  }

  pub fn order_detail(id: &str) -> Self {
    Self::new(ResourceKind::Orders, Operation::Detail, &id)
  }

  pub fn order_recent(limit: usize) -> Self {
    Self::new(ResourceKind::Orders, Operation::Recent, &limit)
  }

  pub fn order_stats() -> Self {
    Self::new(ResourceKind::Orders, Operation::Stats, &())
  }

  pub fn task_list(order_id: &str) -> Self {
    Self::new(
      ResourceKind::Tasks,
      Operation::List,
      &TaskFilter {
        order_id: order_id.to_string(),
      },
    )
  }

  pub fn user_list(filter: &UserFilter) -> Self {
    Self::new(ResourceKind::Users, Operation::List, &filter.normalized())
  }

  pub fn user_detail(id: Uuid) -> Self {
    Self::new(ResourceKind::Users, Operation::Detail, &id)
  }

  pub fn user_stats() -> Self {
    Self::new(ResourceKind::Users, Operation::Stats, &())
  }

  pub fn chart_data() -> Self {
    Self::new(ResourceKind::ChartData, Operation::List, &())
  }

  pub fn kind(&self) -> ResourceKind {
    self.kind
  }

  pub fn operation(&self) -> Operation {
    self.op
  }

  /// Decode the params back into the type that built the key.
  pub fn params<P: DeserializeOwned>(&self) -> Option<P> {
    serde_json::from_str(&self.params).ok()
  }

  /// Stable, fixed-length identity of this key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(self.op.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(self.params.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form for logs.
  pub fn description(&self) -> String {
    format!("{}/{}/{}", self.kind.as_str(), self.op.as_str(), self.params)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description())
  }
}

/// Selects a group of keys for invalidation, snapshots and cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPrefix {
  /// Every key of a resource kind.
  Kind(ResourceKind),
  /// Every key of a kind with the given operation (e.g. all order lists).
  Operation(ResourceKind, Operation),
  Exact(QueryKey),
}

impl KeyPrefix {
  pub fn matches(&self, key: &QueryKey) -> bool {
    match self {
      Self::Kind(kind) => key.kind == *kind,
      Self::Operation(kind, op) => key.kind == *kind && key.op == *op,
      Self::Exact(exact) => exact == key,
    }
  }
}

impl From<QueryKey> for KeyPrefix {
  fn from(key: QueryKey) -> Self {
    Self::Exact(key)
  }
}

impl fmt::Display for KeyPrefix {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Kind(kind) => write!(f, "{}/*", kind.as_str()),
      Self::Operation(kind, op) => write!(f, "{}/{}/*", kind.as_str(), op.as_str()),
      Self::Exact(key) => write!(f, "{}", key),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::OrderStatus;

  #[test]
  fn test_list_and_detail_keys_are_distinct() {
    let list = QueryKey::order_list(&OrderFilter::status(OrderStatus::Pending));
    let detail = QueryKey::order_detail("ORD-001");
    assert_ne!(list, detail);
    assert_ne!(list.cache_hash(), detail.cache_hash());
  }

  #[test]
  fn test_equivalent_filters_share_a_key() {
    let a = QueryKey::order_list(&OrderFilter {
      status: None,
      search: Some("  acme ".to_string()),
    });
    let b = QueryKey::order_list(&OrderFilter {
      status: None,
      search: Some("acme".to_string()),
    });
    assert_eq!(a, b);

    let blank = QueryKey::order_list(&OrderFilter {
      status: None,
      search: Some("   ".to_string()),
    });
    assert_eq!(blank, QueryKey::order_list(&OrderFilter::default()));
  }

  #[test]
  fn test_hash_is_stable_and_fixed_length() {
    let key = QueryKey::order_detail("ORD-001");
    assert_eq!(key.cache_hash(), QueryKey::order_detail("ORD-001").cache_hash());
    assert_eq!(key.cache_hash().len(), 64);
  }

  #[test]
  fn test_params_round_back_into_filter() {
    let filter = OrderFilter::status(OrderStatus::InProgress);
    let key = QueryKey::order_list(&filter);
    assert_eq!(key.params::<OrderFilter>(), Some(filter));
  }

  #[test]
  fn test_every_constructor_has_params() {
    let id = uuid::Uuid::new_v4();
    let keys = [
      QueryKey::order_list(&OrderFilter::default()),
      QueryKey::order_detail("ORD-001"),
      QueryKey::order_recent(5),
      QueryKey::order_stats(),
      QueryKey::task_list("ORD-001"),
      QueryKey::user_list(&UserFilter::default()),
      QueryKey::user_detail(id),
      QueryKey::user_stats(),
      QueryKey::chart_data(),
    ];
    for key in &keys {
      assert!(!key.params.is_empty(), "{} has empty params", key);
    }
    let hashes: std::collections::HashSet<String> = keys.iter().map(QueryKey::cache_hash).collect();
    assert_eq!(hashes.len(), keys.len());
    assert_eq!(keys[6].params::<uuid::Uuid>(), Some(id));
  }

  #[test]
  fn test_prefix_matching() {
    let list = QueryKey::order_list(&OrderFilter::default());
    let detail = QueryKey::order_detail("ORD-001");
    let tasks = QueryKey::task_list("ORD-001");

    let all_orders = KeyPrefix::Kind(ResourceKind::Orders);
    assert!(all_orders.matches(&list));
    assert!(all_orders.matches(&detail));
    assert!(!all_orders.matches(&tasks));

    let order_lists = KeyPrefix::Operation(ResourceKind::Orders, Operation::List);
    assert!(order_lists.matches(&list));
    assert!(!order_lists.matches(&detail));

    let exact = KeyPrefix::from(detail.clone());
    assert!(exact.matches(&detail));
    assert!(!exact.matches(&QueryKey::order_detail("ORD-002")));
  }
}
