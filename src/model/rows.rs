//! Backend row shapes and their conversion into model types.
//!
//! Rows come off the wire as untyped JSON. Every row is decoded into a row
//! struct and then checked field by field before it becomes a model value;
//! one bad row fails the whole response with a validation error.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::input::{CreateOrder, CreateProfile, CreateTask, OrderPatch, ProfilePatch, TaskPatch};
use super::types::{ChartPoint, Order, OrderStatus, Profile, Role, Task, TaskId, TaskStatus};
use super::validate::Checks;
use crate::error::{Result, SyncError, ValidationErrors};

/// Numeric columns may be serialized as JSON numbers or as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
  Number(f64),
  Text(String),
}

impl Numeric {
  fn value(&self) -> Option<f64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Text(s) => s.trim().parse().ok(),
    }
  }

  fn check(&self, errors: &mut ValidationErrors, field: &str) -> f64 {
    match self.value() {
      Some(v) => v,
      None => {
        errors.push(field, "Expected a number");
        f64::NAN
      }
    }
  }
}

/// Decode a JSON array of rows into model values.
pub fn decode_rows<R, T>(rows: Vec<Value>, context: &str) -> Result<Vec<T>>
where
  R: DeserializeOwned,
  T: TryFrom<R, Error = ValidationErrors>,
{
  rows
    .into_iter()
    .map(|row| decode_row::<R, T>(row, context))
    .collect()
}

pub fn decode_row<R, T>(row: Value, context: &str) -> Result<T>
where
  R: DeserializeOwned,
  T: TryFrom<R, Error = ValidationErrors>,
{
  let raw: R = serde_json::from_value(row).map_err(|e| {
    let mut errors = ValidationErrors::new(context);
    errors.push("row", e.to_string());
    SyncError::Validation(errors)
  })?;
  T::try_from(raw).map_err(SyncError::Validation)
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DbOrder {
  pub id: String,
  pub client_name: String,
  pub client_email: String,
  pub project_type: String,
  pub status: OrderStatus,
  pub deadline: String,
  pub amount: Numeric,
  #[serde(default)]
  pub description: String,
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbOrder> for Order {
  type Error = ValidationErrors;

  fn try_from(row: DbOrder) -> std::result::Result<Self, Self::Error> {
    let mut errors = ValidationErrors::new(format!("order {}", row.id));
    errors.require("id", &row.id, "Order ID is required");
    errors.require("client_name", &row.client_name, "Client name is required");
    errors.email("client_email", &row.client_email);
    errors.require("project_type", &row.project_type, "Project type is required");
    let amount = row.amount.check(&mut errors, "amount");
    if amount.is_finite() {
      errors.positive("amount", amount, "Amount must be positive");
    }
    if !errors.is_empty() {
      return Err(errors);
    }

    Ok(Order {
      id: row.id,
      client_name: row.client_name,
      client_email: row.client_email,
      project_type: row.project_type,
      status: row.status,
      deadline: row.deadline,
      amount,
      description: row.description,
      notes: row.notes.unwrap_or_default(),
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(Debug, Serialize)]
pub struct DbOrderInsert<'a> {
  pub client_name: &'a str,
  pub client_email: &'a str,
  pub project_type: &'a str,
  pub status: OrderStatus,
  pub deadline: &'a str,
  pub amount: f64,
  pub description: &'a str,
  pub notes: &'a str,
}

impl<'a> From<&'a CreateOrder> for DbOrderInsert<'a> {
  fn from(input: &'a CreateOrder) -> Self {
    Self {
      client_name: &input.client_name,
      client_email: &input.client_email,
      project_type: &input.project_type,
      status: input.status,
      deadline: &input.deadline,
      amount: input.amount,
      description: &input.description,
      notes: input.notes.as_deref().unwrap_or_default(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct DbOrderUpdate<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub client_name: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub client_email: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub project_type: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<OrderStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deadline: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub amount: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<&'a str>,
}

impl<'a> From<&'a OrderPatch> for DbOrderUpdate<'a> {
  fn from(patch: &'a OrderPatch) -> Self {
    Self {
      client_name: patch.client_name.as_deref(),
      client_email: patch.client_email.as_deref(),
      project_type: patch.project_type.as_deref(),
      status: patch.status,
      deadline: patch.deadline.as_deref(),
      amount: patch.amount,
      description: patch.description.as_deref(),
      notes: patch.notes.as_deref(),
    }
  }
}

/// Projection used for order statistics.
#[derive(Debug, Deserialize)]
pub struct DbOrderTotals {
  pub status: OrderStatus,
  pub amount: Numeric,
}

pub struct OrderTotals {
  pub status: OrderStatus,
  pub amount: f64,
}

impl TryFrom<DbOrderTotals> for OrderTotals {
  type Error = ValidationErrors;

  fn try_from(row: DbOrderTotals) -> std::result::Result<Self, Self::Error> {
    let mut errors = ValidationErrors::new("order totals");
    let amount = row.amount.check(&mut errors, "amount");
    if !errors.is_empty() {
      return Err(errors);
    }
    Ok(OrderTotals {
      status: row.status,
      amount,
    })
  }
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DbTask {
  pub id: TaskId,
  pub order_id: String,
  pub text: String,
  pub status: TaskStatus,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbTask> for Task {
  type Error = ValidationErrors;

  fn try_from(row: DbTask) -> std::result::Result<Self, Self::Error> {
    let mut errors = ValidationErrors::new(format!("task {}", row.id));
    errors.require("order_id", &row.order_id, "Order ID is required");
    errors.require("text", &row.text, "Task text is required");
    if !errors.is_empty() {
      return Err(errors);
    }

    Ok(Task {
      id: row.id,
      order_id: row.order_id,
      text: row.text,
      status: row.status,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(Debug, Serialize)]
pub struct DbTaskInsert<'a> {
  pub order_id: &'a str,
  pub text: &'a str,
  pub status: TaskStatus,
}

impl<'a> From<&'a CreateTask> for DbTaskInsert<'a> {
  fn from(input: &'a CreateTask) -> Self {
    Self {
      order_id: &input.order_id,
      text: &input.text,
      status: input.status,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct DbTaskUpdate<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<TaskStatus>,
}

impl<'a> From<&'a TaskPatch> for DbTaskUpdate<'a> {
  fn from(patch: &'a TaskPatch) -> Self {
    Self {
      text: patch.text.as_deref(),
      status: patch.status,
    }
  }
}

// ============================================================================
// Profiles
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DbProfile {
  pub id: Uuid,
  pub email: String,
  pub full_name: Option<String>,
  pub avatar_url: Option<String>,
  pub role: Role,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProfile> for Profile {
  type Error = ValidationErrors;

  fn try_from(row: DbProfile) -> std::result::Result<Self, Self::Error> {
    let mut errors = ValidationErrors::new(format!("profile {}", row.id));
    errors.email("email", &row.email);
    // An empty avatar string means "no avatar".
    let avatar_url = row.avatar_url.filter(|u| !u.is_empty());
    if let Some(url) = &avatar_url {
      errors.url("avatar_url", url);
    }
    if !errors.is_empty() {
      return Err(errors);
    }

    Ok(Profile {
      id: row.id,
      email: row.email,
      full_name: row.full_name,
      avatar_url,
      role: row.role,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

#[derive(Debug, Serialize)]
pub struct DbProfileInsert<'a> {
  pub id: Uuid,
  pub email: &'a str,
  pub full_name: Option<&'a str>,
  pub avatar_url: Option<&'a str>,
  pub role: Role,
}

impl<'a> From<&'a CreateProfile> for DbProfileInsert<'a> {
  fn from(input: &'a CreateProfile) -> Self {
    Self {
      id: input.id,
      email: &input.email,
      full_name: input.full_name.as_deref(),
      avatar_url: input.avatar_url.as_deref().filter(|u| !u.is_empty()),
      role: input.role,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct DbProfileUpdate<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub full_name: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub avatar_url: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role: Option<Role>,
  pub updated_at: DateTime<Utc>,
}

impl<'a> DbProfileUpdate<'a> {
  pub fn new(patch: &'a ProfilePatch, now: DateTime<Utc>) -> Self {
    Self {
      email: patch.email.as_deref(),
      full_name: patch.full_name.as_deref(),
      avatar_url: patch.avatar_url.as_deref(),
      role: patch.role,
      updated_at: now,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct DbRole {
  pub role: Role,
}

impl TryFrom<DbRole> for Role {
  type Error = ValidationErrors;

  fn try_from(row: DbRole) -> std::result::Result<Self, Self::Error> {
    Ok(row.role)
  }
}

// ============================================================================
// Chart data
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DbChartPoint {
  pub name: String,
  pub average: Numeric,
  pub today: Numeric,
}

impl TryFrom<DbChartPoint> for ChartPoint {
  type Error = ValidationErrors;

  fn try_from(row: DbChartPoint) -> std::result::Result<Self, Self::Error> {
    let mut errors = ValidationErrors::new(format!("chart point {}", row.name));
    let average = row.average.check(&mut errors, "average");
    let today = row.today.check(&mut errors, "today");
    if !errors.is_empty() {
      return Err(errors);
    }
    Ok(ChartPoint {
      name: row.name,
      average,
      today,
    })
  }
}
