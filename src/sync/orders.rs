use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::mutation::{Action, MutationPlan};
use super::Dashboard;
use crate::cache::{CacheResult, CacheStore, KeyPrefix, Operation, QueryKey, ResourceKind};
use crate::error::Result;
use crate::gateway::OrdersGateway;
use crate::model::{CreateOrder, Order, OrderFilter, OrderPatch, OrderStats, OrderStatus};
use crate::query::Query;

const KIND: ResourceKind = ResourceKind::Orders;

fn order_lists() -> KeyPrefix {
  KeyPrefix::Operation(KIND, Operation::List)
}

fn recent_lists() -> KeyPrefix {
  KeyPrefix::Operation(KIND, Operation::Recent)
}

fn stats() -> KeyPrefix {
  KeyPrefix::Operation(KIND, Operation::Stats)
}

impl<G: OrdersGateway> Dashboard<G> {
  pub async fn list_orders(&self, filter: &OrderFilter) -> Result<CacheResult<Vec<Order>>> {
    let key = QueryKey::order_list(filter);
    self
      .client
      .fetch(&key, || self.gateway.fetch_orders(filter))
      .await
  }

  pub async fn order(&self, id: &str) -> Result<CacheResult<Order>> {
    let key = QueryKey::order_detail(id);
    self.client.fetch(&key, || self.gateway.fetch_order(id)).await
  }

  pub async fn recent_orders(&self, limit: usize) -> Result<CacheResult<Vec<Order>>> {
    let key = QueryKey::order_recent(limit);
    self
      .client
      .fetch(&key, || self.gateway.fetch_recent_orders(limit))
      .await
  }

  pub async fn order_stats(&self) -> Result<CacheResult<OrderStats>> {
    let key = QueryKey::order_stats();
    self
      .client
      .fetch(&key, || self.gateway.fetch_order_stats())
      .await
  }

  pub fn observe_orders(&self, filter: &OrderFilter) -> Query<Vec<Order>> {
    let gateway = Arc::clone(&self.gateway);
    let filter = filter.normalized();
    self.client.observe(QueryKey::order_list(&filter), move || {
      let gateway = Arc::clone(&gateway);
      let filter = filter.clone();
      async move { gateway.fetch_orders(&filter).await }
    })
  }

  pub fn observe_order(&self, id: &str) -> Query<Order> {
    let gateway = Arc::clone(&self.gateway);
    let id = id.to_string();
    self.client.observe(QueryKey::order_detail(&id), move || {
      let gateway = Arc::clone(&gateway);
      let id = id.clone();
      async move { gateway.fetch_order(&id).await }
    })
  }

  pub fn observe_recent_orders(&self, limit: usize) -> Query<Vec<Order>> {
    let gateway = Arc::clone(&self.gateway);
    self.client.observe(QueryKey::order_recent(limit), move || {
      let gateway = Arc::clone(&gateway);
      async move { gateway.fetch_recent_orders(limit).await }
    })
  }

  pub fn observe_order_stats(&self) -> Query<OrderStats> {
    let gateway = Arc::clone(&self.gateway);
    self.client.observe(QueryKey::order_stats(), move || {
      let gateway = Arc::clone(&gateway);
      async move { gateway.fetch_order_stats().await }
    })
  }

  /// Create an order. Until the backend answers, cached lists show it under a
  /// placeholder id.
  pub async fn create_order(&self, input: &CreateOrder) -> Result<Order> {
    let plan = MutationPlan::new(KIND, Action::Create, &input.client_name)
      .affects(KeyPrefix::Kind(KIND));
    if let Err(err) = input.validate() {
      return Err(self.coordinator.reject(&plan, err));
    }

    let placeholder = input.to_placeholder(Utc::now());
    self
      .coordinator
      .run(
        plan,
        |store| insert_order(store, &placeholder),
        || self.gateway.create_order(input),
        |store, created| replace_order(store, &placeholder.id, created),
      )
      .await
  }

  pub async fn update_order(&self, patch: &OrderPatch) -> Result<Order> {
    let plan =
      MutationPlan::new(KIND, Action::Update, &patch.id).affects(KeyPrefix::Kind(KIND));
    if let Err(err) = patch.validate() {
      return Err(self.coordinator.reject(&plan, err));
    }

    self
      .coordinator
      .run(
        plan,
        |store| patch_order(store, patch),
        || self.gateway.update_order(patch),
        |store, updated| replace_order(store, &updated.id, updated),
      )
      .await
  }

  pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Order> {
    self.update_order(&OrderPatch::status(id, status)).await
  }

  /// Delete an order and drop its cached tasks. Deleting an order that is
  /// already gone succeeds.
  pub async fn delete_order(&self, id: &str) -> Result<()> {
    let tasks = QueryKey::task_list(id);
    let plan = MutationPlan::new(KIND, Action::Delete, id)
      .affects(KeyPrefix::Kind(KIND))
      .affects(KeyPrefix::Exact(tasks.clone()));

    self
      .coordinator
      .run(
        plan,
        |store| {
          remove_order(store, id)?;
          store.remove(&tasks);
          Ok(())
        },
        || async {
          match self.gateway.delete_order(id).await {
            Err(err) if err.is_not_found() => {
              debug!(order = id, "order already deleted");
              Ok(())
            }
            result => result,
          }
        },
        |_, _| Ok(()),
      )
      .await
  }
}

/// The newest cached copy of an order, if any entry holds it.
fn cached_order(store: &CacheStore, id: &str) -> Option<Order> {
  if let Ok(Some(order)) = store.get_data::<Order>(&QueryKey::order_detail(id)) {
    return Some(order);
  }
  [order_lists(), recent_lists()]
    .iter()
    .flat_map(|prefix| store.entries(prefix))
    .find_map(|(_, entry)| {
      let list = entry.decode::<Vec<Order>>().ok().flatten()?;
      list.into_iter().find(|o| o.id == id)
    })
}

fn belongs(key: &QueryKey, order: &Order) -> bool {
  key
    .params::<OrderFilter>()
    .is_some_and(|filter| filter.matches(order))
}

/// Lists are newest first.
fn insert_by_created(list: &mut Vec<Order>, order: Order) {
  let pos = list
    .iter()
    .position(|o| o.created_at < order.created_at)
    .unwrap_or(list.len());
  list.insert(pos, order);
}

/// Recent lists are nearest deadline first and capped at their limit.
fn insert_by_deadline(key: &QueryKey, list: &mut Vec<Order>, order: Order) {
  let limit = key.params::<usize>().unwrap_or(usize::MAX);
  let pos = list
    .iter()
    .position(|o| o.deadline > order.deadline)
    .unwrap_or(list.len());
  list.insert(pos, order);
  list.truncate(limit);
}

fn status_count(stats: &mut OrderStats, status: OrderStatus) -> &mut usize {
  match status {
    OrderStatus::Pending => &mut stats.pending,
    OrderStatus::InProgress => &mut stats.in_progress,
    OrderStatus::Completed => &mut stats.completed,
    OrderStatus::Cancelled => &mut stats.cancelled,
  }
}

fn count_order(stats: &mut OrderStats, order: &Order) {
  stats.total += 1;
  stats.total_revenue += order.amount;
  *status_count(stats, order.status) += 1;
}

fn uncount_order(stats: &mut OrderStats, order: &Order) {
  stats.total = stats.total.saturating_sub(1);
  stats.total_revenue -= order.amount;
  let count = status_count(stats, order.status);
  *count = count.saturating_sub(1);
}

fn insert_order(store: &CacheStore, order: &Order) -> Result<()> {
  store.update::<Vec<Order>, _>(&order_lists(), |key, list| {
    if belongs(key, order) && !list.iter().any(|o| o.id == order.id) {
      insert_by_created(list, order.clone());
    }
  })?;
  store.update::<Vec<Order>, _>(&recent_lists(), |key, list| {
    insert_by_deadline(key, list, order.clone());
  })?;
  store.update::<OrderStats, _>(&stats(), |_, stats| count_order(stats, order))?;
  Ok(())
}

fn patch_order(store: &CacheStore, patch: &OrderPatch) -> Result<()> {
  let current = cached_order(store, &patch.id);
  let updated = current.clone().map(|mut order| {
    patch.apply_to(&mut order);
    order
  });

  store.update::<Order, _>(
    &KeyPrefix::Exact(QueryKey::order_detail(&patch.id)),
    |_, order| patch.apply_to(order),
  )?;
  store.update::<Vec<Order>, _>(&order_lists(), |key, list| {
    match list.iter().position(|o| o.id == patch.id) {
      Some(pos) => {
        patch.apply_to(&mut list[pos]);
        if !belongs(key, &list[pos]) {
          list.remove(pos);
        }
      }
      None => {
        if let Some(order) = updated.as_ref().filter(|o| belongs(key, o)) {
          insert_by_created(list, order.clone());
        }
      }
    }
  })?;
  store.update::<Vec<Order>, _>(&recent_lists(), |_, list| {
    if let Some(order) = list.iter_mut().find(|o| o.id == patch.id) {
      patch.apply_to(order);
      list.sort_by(|a, b| a.deadline.cmp(&b.deadline));
    }
  })?;
  if let (Some(before), Some(after)) = (&current, &updated) {
    store.update::<OrderStats, _>(&stats(), |_, stats| {
      uncount_order(stats, before);
      count_order(stats, after);
    })?;
  }
  Ok(())
}

/// Write the backend's copy of an order over the cached one stored under `id`.
fn replace_order(store: &CacheStore, id: &str, order: &Order) -> Result<()> {
  store.update::<Vec<Order>, _>(&order_lists(), |key, list| {
    if let Some(pos) = list.iter().position(|o| o.id == id) {
      if belongs(key, order) {
        list[pos] = order.clone();
      } else {
        list.remove(pos);
      }
    }
  })?;
  store.update::<Vec<Order>, _>(&recent_lists(), |_, list| {
    if let Some(slot) = list.iter_mut().find(|o| o.id == id) {
      *slot = order.clone();
    }
  })?;
  store.set(&QueryKey::order_detail(&order.id), order)
}

fn remove_order(store: &CacheStore, id: &str) -> Result<()> {
  let current = cached_order(store, id);
  store.update::<Vec<Order>, _>(&order_lists(), |_, list| list.retain(|o| o.id != id))?;
  store.update::<Vec<Order>, _>(&recent_lists(), |_, list| list.retain(|o| o.id != id))?;
  if let Some(order) = &current {
    store.update::<OrderStats, _>(&stats(), |_, stats| uncount_order(stats, order))?;
  }
  store.remove(&QueryKey::order_detail(id));
  Ok(())
}
