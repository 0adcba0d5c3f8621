//! Remote resource gateways: the only I/O boundary of the sync layer.
//!
//! One trait per resource kind. [`RestGateway`] implements all of them over
//! the backend's REST API; tests use an in-memory backend instead.

use std::future::Future;

use uuid::Uuid;

use crate::error::Result;
use crate::model::{
  ChartPoint, CreateOrder, CreateProfile, CreateTask, Order, OrderFilter, OrderPatch, OrderStats,
  Profile, ProfilePatch, Task, TaskFilter, TaskId, TaskPatch, UserFilter, UserStats,
};

mod chart;
#[cfg(test)]
pub(crate) mod fake;
mod orders;
mod rest;
mod tasks;
mod users;

pub use rest::{Credentials, RestGateway};

/// Default number of orders returned by [`OrdersGateway::fetch_recent_orders`].
pub const RECENT_ORDERS_LIMIT: usize = 5;

pub trait OrdersGateway: Send + Sync + 'static {
  /// Orders matching `filter`, newest first. Never fails with not-found.
  fn fetch_orders(&self, filter: &OrderFilter) -> impl Future<Output = Result<Vec<Order>>> + Send;

  fn fetch_order(&self, id: &str) -> impl Future<Output = Result<Order>> + Send;

  /// Validates `input` before anything is sent.
  fn create_order(&self, input: &CreateOrder) -> impl Future<Output = Result<Order>> + Send;

  /// Fields absent from the patch are left unchanged.
  fn update_order(&self, patch: &OrderPatch) -> impl Future<Output = Result<Order>> + Send;

  /// Fails with not-found when no row was deleted.
  fn delete_order(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

  /// Orders with the nearest deadlines first.
  fn fetch_recent_orders(&self, limit: usize) -> impl Future<Output = Result<Vec<Order>>> + Send;

  fn fetch_order_stats(&self) -> impl Future<Output = Result<OrderStats>> + Send;
}

pub trait TasksGateway: Send + Sync + 'static {
  /// Tasks of one order, oldest first.
  fn fetch_tasks(&self, filter: &TaskFilter) -> impl Future<Output = Result<Vec<Task>>> + Send;

  fn fetch_task(&self, id: &TaskId) -> impl Future<Output = Result<Task>> + Send;

  fn create_task(&self, input: &CreateTask) -> impl Future<Output = Result<Task>> + Send;

  fn update_task(&self, patch: &TaskPatch) -> impl Future<Output = Result<Task>> + Send;

  fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<()>> + Send;

  /// Apply several patches; fails if any of them fails.
  fn update_tasks(&self, patches: &[TaskPatch]) -> impl Future<Output = Result<Vec<Task>>> + Send;
}

pub trait UsersGateway: Send + Sync + 'static {
  /// Profiles matching `filter`, newest first.
  fn fetch_users(&self, filter: &UserFilter) -> impl Future<Output = Result<Vec<Profile>>> + Send;

  fn fetch_user(&self, id: Uuid) -> impl Future<Output = Result<Profile>> + Send;

  fn create_user(&self, input: &CreateProfile) -> impl Future<Output = Result<Profile>> + Send;

  /// Stamps `updated_at` on the row.
  fn update_user(&self, patch: &ProfilePatch) -> impl Future<Output = Result<Profile>> + Send;

  fn delete_user(&self, id: Uuid) -> impl Future<Output = Result<()>> + Send;

  fn fetch_user_stats(&self) -> impl Future<Output = Result<UserStats>> + Send;
}

pub trait ChartGateway: Send + Sync + 'static {
  /// Up to seven points in date order, or a fixed default week when the
  /// backend has none.
  fn fetch_chart_data(&self) -> impl Future<Output = Result<Vec<ChartPoint>>> + Send;
}
