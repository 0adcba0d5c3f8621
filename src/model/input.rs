//! Write inputs. Each input validates itself and knows how to project its
//! effect onto a cached entity for optimistic updates.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{placeholder_id, Order, OrderStatus, Profile, Role, Task, TaskId, TaskStatus};
use super::validate::Checks;
use crate::error::{Result, ValidationErrors};

/// A new order; the backend assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrder {
  pub client_name: String,
  pub client_email: String,
  pub project_type: String,
  pub status: OrderStatus,
  pub deadline: String,
  pub amount: f64,
  pub description: String,
  pub notes: Option<String>,
}

impl CreateOrder {
  pub fn validate(&self) -> Result<()> {
    let mut errors = ValidationErrors::new("create order input");
    errors.require("client_name", &self.client_name, "Client name is required");
    errors.email("client_email", &self.client_email);
    errors.require("project_type", &self.project_type, "Project type is required");
    errors.require("deadline", &self.deadline, "Deadline is required");
    errors.positive("amount", self.amount, "Amount must be positive");
    errors.require("description", &self.description, "Description is required");
    errors.into_result()
  }

  /// The order as it will look once created, under a client-generated id.
  pub fn to_placeholder(&self, now: DateTime<Utc>) -> Order {
    Order {
      id: placeholder_id(),
      client_name: self.client_name.clone(),
      client_email: self.client_email.clone(),
      project_type: self.project_type.clone(),
      status: self.status,
      deadline: self.deadline.clone(),
      amount: self.amount,
      description: self.description.clone(),
      notes: self.notes.clone().unwrap_or_default(),
      created_at: now,
      updated_at: None,
    }
  }
}

/// Partial order update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
  pub id: String,
  pub client_name: Option<String>,
  pub client_email: Option<String>,
  pub project_type: Option<String>,
  pub status: Option<OrderStatus>,
  pub deadline: Option<String>,
  pub amount: Option<f64>,
  pub description: Option<String>,
  pub notes: Option<String>,
}

impl OrderPatch {
  pub fn status(id: impl Into<String>, status: OrderStatus) -> Self {
    Self {
      id: id.into(),
      status: Some(status),
      ..Default::default()
    }
  }

  pub fn validate(&self) -> Result<()> {
    let mut errors = ValidationErrors::new("update order input");
    errors.require("id", &self.id, "Order ID is required");
    if let Some(name) = &self.client_name {
      errors.require("client_name", name, "Client name is required");
    }
    if let Some(email) = &self.client_email {
      errors.email("client_email", email);
    }
    if let Some(project_type) = &self.project_type {
      errors.require("project_type", project_type, "Project type is required");
    }
    if let Some(amount) = self.amount {
      errors.positive("amount", amount, "Amount must be positive");
    }
    errors.into_result()
  }

  pub fn apply_to(&self, order: &mut Order) {
    if let Some(v) = &self.client_name {
      order.client_name = v.clone();
    }
    if let Some(v) = &self.client_email {
      order.client_email = v.clone();
    }
    if let Some(v) = &self.project_type {
      order.project_type = v.clone();
    }
    if let Some(v) = self.status {
      order.status = v;
    }
    if let Some(v) = &self.deadline {
      order.deadline = v.clone();
    }
    if let Some(v) = self.amount {
      order.amount = v;
    }
    if let Some(v) = &self.description {
      order.description = v.clone();
    }
    if let Some(v) = &self.notes {
      order.notes = v.clone();
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTask {
  pub order_id: String,
  pub text: String,
  pub status: TaskStatus,
}

impl CreateTask {
  pub fn new(order_id: impl Into<String>, text: impl Into<String>) -> Self {
    Self {
      order_id: order_id.into(),
      text: text.into(),
      status: TaskStatus::Pending,
    }
  }

  pub fn validate(&self) -> Result<()> {
    let mut errors = ValidationErrors::new("create task input");
    errors.require("order_id", &self.order_id, "Order ID is required");
    errors.require("text", &self.text, "Task text is required");
    errors.into_result()
  }

  pub fn to_placeholder(&self, now: DateTime<Utc>) -> Task {
    Task {
      id: TaskId::placeholder(),
      order_id: self.order_id.clone(),
      text: self.text.clone(),
      status: self.status,
      created_at: Some(now),
      updated_at: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch {
  pub id: TaskId,
  pub text: Option<String>,
  pub status: Option<TaskStatus>,
}

impl TaskPatch {
  pub fn status(id: TaskId, status: TaskStatus) -> Self {
    Self {
      id,
      text: None,
      status: Some(status),
    }
  }

  pub fn validate(&self) -> Result<()> {
    let mut errors = ValidationErrors::new("update task input");
    if let Some(text) = &self.text {
      errors.require("text", text, "Task text is required");
    }
    errors.into_result()
  }

  pub fn apply_to(&self, task: &mut Task) {
    if let Some(text) = &self.text {
      task.text = text.clone();
    }
    if let Some(status) = self.status {
      task.status = status;
    }
  }
}

/// Profile row for an account the auth provider already created.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateProfile {
  pub id: Uuid,
  pub email: String,
  pub full_name: Option<String>,
  pub avatar_url: Option<String>,
  pub role: Role,
}

impl CreateProfile {
  pub fn validate(&self) -> Result<()> {
    let mut errors = ValidationErrors::new("create user input");
    errors.email("email", &self.email);
    if let Some(url) = self.avatar_url.as_deref().filter(|u| !u.is_empty()) {
      errors.url("avatar_url", url);
    }
    errors.into_result()
  }

  pub fn to_placeholder(&self, now: DateTime<Utc>) -> Profile {
    Profile {
      id: self.id,
      email: self.email.clone(),
      full_name: self.full_name.clone(),
      avatar_url: self.avatar_url.clone().filter(|u| !u.is_empty()),
      role: self.role,
      created_at: now,
      updated_at: now,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePatch {
  pub id: Uuid,
  pub email: Option<String>,
  pub full_name: Option<String>,
  pub avatar_url: Option<String>,
  pub role: Option<Role>,
}

impl ProfilePatch {
  pub fn role(id: Uuid, role: Role) -> Self {
    Self {
      id,
      email: None,
      full_name: None,
      avatar_url: None,
      role: Some(role),
    }
  }

  pub fn validate(&self) -> Result<()> {
    let mut errors = ValidationErrors::new("update user input");
    if let Some(email) = &self.email {
      errors.email("email", email);
    }
    if let Some(url) = self.avatar_url.as_deref().filter(|u| !u.is_empty()) {
      errors.url("avatar_url", url);
    }
    errors.into_result()
  }

  pub fn apply_to(&self, profile: &mut Profile, now: DateTime<Utc>) {
    if let Some(v) = &self.email {
      profile.email = v.clone();
    }
    if let Some(v) = &self.full_name {
      profile.full_name = Some(v.clone());
    }
    if let Some(v) = &self.avatar_url {
      profile.avatar_url = Some(v.clone()).filter(|u| !u.is_empty());
    }
    if let Some(v) = self.role {
      profile.role = v;
    }
    profile.updated_at = now;
  }
}
