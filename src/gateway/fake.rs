//! In-memory backend for tests.
//!
//! Behaves like the real backend for every gateway trait, and can be told to
//! fail or to hold write calls open until the test releases them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{ChartGateway, OrdersGateway, TasksGateway, UsersGateway};
use crate::cache::ResourceKind;
use crate::error::{Result, SyncError};
use crate::model::{
  ChartPoint, CreateOrder, CreateProfile, CreateTask, Order, OrderFilter, OrderPatch, OrderStats,
  OrderStatus, Profile, ProfilePatch, Role, Task, TaskFilter, TaskId, TaskPatch, TaskStatus,
  UserFilter, UserStats,
};

/// Holds write calls open. `called` fires when a write reaches the backend;
/// the write continues once `release` is notified.
#[derive(Default)]
pub(crate) struct Gate {
  pub called: Notify,
  pub release: Notify,
}

#[derive(Default)]
struct Data {
  orders: Vec<Order>,
  tasks: Vec<Task>,
  users: Vec<Profile>,
  chart: Vec<ChartPoint>,
  next_order: u32,
  next_task: i64,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
  data: Mutex<Data>,
  offline: AtomicBool,
  fail_next_write: Mutex<Option<SyncError>>,
  gate: Mutex<Option<Arc<Gate>>>,
  calls: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn timestamp(day: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()
}

pub(crate) fn order(id: &str, status: OrderStatus, amount: f64, day: u32) -> Order {
  Order {
    id: id.to_string(),
    client_name: format!("Client {}", id),
    client_email: "client@example.com".to_string(),
    project_type: "Website".to_string(),
    status,
    deadline: format!("2024-07-{:02}", day),
    amount,
    description: "Build it".to_string(),
    notes: String::new(),
    created_at: timestamp(day),
    updated_at: None,
  }
}

pub(crate) fn task(id: i64, order_id: &str, text: &str) -> Task {
  Task {
    id: TaskId::Number(id),
    order_id: order_id.to_string(),
    text: text.to_string(),
    status: TaskStatus::Pending,
    created_at: Some(timestamp(1) + Duration::minutes(id)),
    updated_at: None,
  }
}

pub(crate) fn profile(email: &str, role: Role, day: u32) -> Profile {
  Profile {
    id: Uuid::new_v4(),
    email: email.to_string(),
    full_name: None,
    avatar_url: None,
    role,
    created_at: timestamp(day),
    updated_at: timestamp(day),
  }
}

pub(crate) fn new_order(amount: f64) -> CreateOrder {
  CreateOrder {
    client_name: "Acme".to_string(),
    client_email: "ops@acme.test".to_string(),
    project_type: "Website".to_string(),
    status: OrderStatus::Pending,
    deadline: "2024-08-01".to_string(),
    amount,
    description: "Landing page".to_string(),
    notes: None,
  }
}

impl FakeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_orders(self, orders: Vec<Order>) -> Self {
    lock(&self.data).orders = orders;
    self
  }

  pub fn with_tasks(self, tasks: Vec<Task>) -> Self {
    lock(&self.data).tasks = tasks;
    self
  }

  pub fn with_users(self, users: Vec<Profile>) -> Self {
    lock(&self.data).users = users;
    self
  }

  pub fn with_chart(self, chart: Vec<ChartPoint>) -> Self {
    lock(&self.data).chart = chart;
    self
  }

  /// Every call fails with a transport error while offline.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn fail_next_write(&self, err: SyncError) {
    *lock(&self.fail_next_write) = Some(err);
  }

  /// Hold every following write open until released through the gate.
  pub fn hold_writes(&self) -> Arc<Gate> {
    let gate = Arc::new(Gate::default());
    *lock(&self.gate) = Some(Arc::clone(&gate));
    gate
  }

  pub fn calls(&self) -> Vec<String> {
    lock(&self.calls).clone()
  }

  pub fn orders(&self) -> Vec<Order> {
    lock(&self.data).orders.clone()
  }

  pub fn tasks(&self) -> Vec<Task> {
    lock(&self.data).tasks.clone()
  }

  fn read(&self, call: &str) -> Result<()> {
    lock(&self.calls).push(call.to_string());
    if self.offline.load(Ordering::SeqCst) {
      return Err(SyncError::transport("network unreachable"));
    }
    Ok(())
  }

  async fn write(&self, call: &str) -> Result<()> {
    lock(&self.calls).push(call.to_string());
    let gate = lock(&self.gate).clone();
    if let Some(gate) = gate {
      gate.called.notify_one();
      gate.release.notified().await;
    }
    if self.offline.load(Ordering::SeqCst) {
      return Err(SyncError::transport("network unreachable"));
    }
    match lock(&self.fail_next_write).take() {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

impl OrdersGateway for FakeBackend {
  async fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
    self.read("fetch_orders")?;
    let mut orders: Vec<Order> = lock(&self.data)
      .orders
      .iter()
      .filter(|o| filter.matches(o))
      .cloned()
      .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
  }

  async fn fetch_order(&self, id: &str) -> Result<Order> {
    self.read("fetch_order")?;
    lock(&self.data)
      .orders
      .iter()
      .find(|o| o.id == id)
      .cloned()
      .ok_or_else(|| SyncError::not_found(ResourceKind::Orders, id))
  }

  async fn create_order(&self, input: &CreateOrder) -> Result<Order> {
    input.validate()?;
    self.write("create_order").await?;
    let mut data = lock(&self.data);
    data.next_order += 1;
    let mut order = input.to_placeholder(Utc::now());
    order.id = format!("ORD-{:03}", 100 + data.next_order);
    data.orders.push(order.clone());
    Ok(order)
  }

  async fn update_order(&self, patch: &OrderPatch) -> Result<Order> {
    patch.validate()?;
    self.write("update_order").await?;
    let mut data = lock(&self.data);
    let order = data
      .orders
      .iter_mut()
      .find(|o| o.id == patch.id)
      .ok_or_else(|| SyncError::not_found(ResourceKind::Orders, &patch.id))?;
    patch.apply_to(order);
    order.updated_at = Some(Utc::now());
    Ok(order.clone())
  }

  async fn delete_order(&self, id: &str) -> Result<()> {
    self.write("delete_order").await?;
    let mut data = lock(&self.data);
    let before = data.orders.len();
    data.orders.retain(|o| o.id != id);
    if data.orders.len() == before {
      return Err(SyncError::not_found(ResourceKind::Orders, id));
    }
    data.tasks.retain(|t| t.order_id != id);
    Ok(())
  }

  async fn fetch_recent_orders(&self, limit: usize) -> Result<Vec<Order>> {
    self.read("fetch_recent_orders")?;
    let mut orders = lock(&self.data).orders.clone();
    orders.sort_by(|a, b| a.deadline.cmp(&b.deadline));
    orders.truncate(limit);
    Ok(orders)
  }

  async fn fetch_order_stats(&self) -> Result<OrderStats> {
    self.read("fetch_order_stats")?;
    let data = lock(&self.data);
    Ok(OrderStats::tally(data.orders.iter().map(|o| (o.status, o.amount))))
  }
}

impl TasksGateway for FakeBackend {
  async fn fetch_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
    self.read("fetch_tasks")?;
    let mut tasks: Vec<Task> = lock(&self.data)
      .tasks
      .iter()
      .filter(|t| t.order_id == filter.order_id)
      .cloned()
      .collect();
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(tasks)
  }

  async fn fetch_task(&self, id: &TaskId) -> Result<Task> {
    self.read("fetch_task")?;
    lock(&self.data)
      .tasks
      .iter()
      .find(|t| &t.id == id)
      .cloned()
      .ok_or_else(|| SyncError::not_found(ResourceKind::Tasks, id))
  }

  async fn create_task(&self, input: &CreateTask) -> Result<Task> {
    input.validate()?;
    self.write("create_task").await?;
    let mut data = lock(&self.data);
    data.next_task += 1;
    let mut task = input.to_placeholder(Utc::now());
    task.id = TaskId::Number(1000 + data.next_task);
    data.tasks.push(task.clone());
    Ok(task)
  }

  async fn update_task(&self, patch: &TaskPatch) -> Result<Task> {
    patch.validate()?;
    self.write("update_task").await?;
    let mut data = lock(&self.data);
    let task = data
      .tasks
      .iter_mut()
      .find(|t| t.id == patch.id)
      .ok_or_else(|| SyncError::not_found(ResourceKind::Tasks, &patch.id))?;
    patch.apply_to(task);
    task.updated_at = Some(Utc::now());
    Ok(task.clone())
  }

  async fn delete_task(&self, id: &TaskId) -> Result<()> {
    self.write("delete_task").await?;
    let mut data = lock(&self.data);
    let before = data.tasks.len();
    data.tasks.retain(|t| &t.id != id);
    if data.tasks.len() == before {
      return Err(SyncError::not_found(ResourceKind::Tasks, id));
    }
    Ok(())
  }

  async fn update_tasks(&self, patches: &[TaskPatch]) -> Result<Vec<Task>> {
    for patch in patches {
      patch.validate()?;
    }
    self.write("update_tasks").await?;
    let mut data = lock(&self.data);
    if let Some(missing) = patches
      .iter()
      .find(|p| !data.tasks.iter().any(|t| t.id == p.id))
    {
      return Err(SyncError::not_found(ResourceKind::Tasks, &missing.id));
    }
    let now = Utc::now();
    Ok(
      patches
        .iter()
        .filter_map(|patch| {
          let task = data.tasks.iter_mut().find(|t| t.id == patch.id)?;
          patch.apply_to(task);
          task.updated_at = Some(now);
          Some(task.clone())
        })
        .collect(),
    )
  }
}

impl UsersGateway for FakeBackend {
  async fn fetch_users(&self, filter: &UserFilter) -> Result<Vec<Profile>> {
    self.read("fetch_users")?;
    let mut users: Vec<Profile> = lock(&self.data)
      .users
      .iter()
      .filter(|u| filter.matches(u))
      .cloned()
      .collect();
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(users)
  }

  async fn fetch_user(&self, id: Uuid) -> Result<Profile> {
    self.read("fetch_user")?;
    lock(&self.data)
      .users
      .iter()
      .find(|u| u.id == id)
      .cloned()
      .ok_or_else(|| SyncError::not_found(ResourceKind::Users, id))
  }

  async fn create_user(&self, input: &CreateProfile) -> Result<Profile> {
    input.validate()?;
    self.write("create_user").await?;
    let profile = input.to_placeholder(Utc::now());
    lock(&self.data).users.push(profile.clone());
    Ok(profile)
  }

  async fn update_user(&self, patch: &ProfilePatch) -> Result<Profile> {
    patch.validate()?;
    self.write("update_user").await?;
    let mut data = lock(&self.data);
    let profile = data
      .users
      .iter_mut()
      .find(|u| u.id == patch.id)
      .ok_or_else(|| SyncError::not_found(ResourceKind::Users, patch.id))?;
    patch.apply_to(profile, Utc::now());
    Ok(profile.clone())
  }

  async fn delete_user(&self, id: Uuid) -> Result<()> {
    self.write("delete_user").await?;
    let mut data = lock(&self.data);
    let before = data.users.len();
    data.users.retain(|u| u.id != id);
    if data.users.len() == before {
      return Err(SyncError::not_found(ResourceKind::Users, id));
    }
    Ok(())
  }

  async fn fetch_user_stats(&self) -> Result<UserStats> {
    self.read("fetch_user_stats")?;
    Ok(UserStats::tally(lock(&self.data).users.iter().map(|u| u.role)))
  }
}

impl ChartGateway for FakeBackend {
  async fn fetch_chart_data(&self) -> Result<Vec<ChartPoint>> {
    self.read("fetch_chart_data")?;
    let chart = lock(&self.data).chart.clone();
    if chart.is_empty() {
      return Ok(ChartPoint::default_week());
    }
    Ok(chart.into_iter().take(7).collect())
  }
}
