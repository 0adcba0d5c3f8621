//! Application-level entities, independent of the backend's row layout.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of client-generated ids used for optimistic creates.
pub const PLACEHOLDER_PREFIX: &str = "temp-";

/// Generate an id for an entity that does not exist on the backend yet.
pub fn placeholder_id() -> String {
  format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4())
}

pub fn is_placeholder(id: &str) -> bool {
  id.starts_with(PLACEHOLDER_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
  Pending,
  #[serde(rename = "In Progress")]
  InProgress,
  Completed,
  Cancelled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 4] = [
    OrderStatus::Pending,
    OrderStatus::InProgress,
    OrderStatus::Completed,
    OrderStatus::Cancelled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "Pending",
      Self::InProgress => "In Progress",
      Self::Completed => "Completed",
      Self::Cancelled => "Cancelled",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = String;

  /// Accepts the wire form as well as `in-progress` / `in_progress`, case-insensitively.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
    Self::ALL
      .into_iter()
      .find(|status| status.as_str().to_lowercase() == normalized)
      .ok_or_else(|| format!("unknown order status '{}'", s))
  }
}

/// A client order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  pub id: String,
  pub client_name: String,
  pub client_email: String,
  pub project_type: String,
  pub status: OrderStatus,
  /// Date string as entered; no particular format is enforced.
  pub deadline: String,
  pub amount: f64,
  pub description: String,
  pub notes: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
  Pending,
  InProgress,
  Completed,
}

impl TaskStatus {
  pub const ALL: [TaskStatus; 3] = [
    TaskStatus::Pending,
    TaskStatus::InProgress,
    TaskStatus::Completed,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::InProgress => "in-progress",
      Self::Completed => "completed",
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
    Self::ALL
      .into_iter()
      .find(|status| status.as_str() == normalized)
      .ok_or_else(|| format!("unknown task status '{}'", s))
  }
}

/// Task ids are integers on the backend; optimistic placeholders are strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
  Number(i64),
  Text(String),
}

impl TaskId {
  pub fn placeholder() -> Self {
    Self::Text(placeholder_id())
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(n) => write!(f, "{}", n),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl FromStr for TaskId {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.trim().parse::<i64>() {
      Ok(n) => Self::Number(n),
      Err(_) => Self::Text(s.to_string()),
    })
  }
}

impl From<i64> for TaskId {
  fn from(n: i64) -> Self {
    Self::Number(n)
  }
}

/// A work item belonging to exactly one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: TaskId,
  pub order_id: String,
  pub text: String,
  pub status: TaskStatus,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Admin,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::User => "user",
      Self::Admin => "admin",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "user" => Ok(Self::User),
      "admin" => Ok(Self::Admin),
      _ => Err(format!("unknown role '{}'", s)),
    }
  }
}

/// A user profile. The role gates admin-only screens in the UI; this layer
/// does not enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub id: Uuid,
  pub email: String,
  pub full_name: Option<String>,
  pub avatar_url: Option<String>,
  pub role: Role,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// One day of the dashboard's weekly chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
  pub name: String,
  pub average: f64,
  pub today: f64,
}

impl ChartPoint {
  fn new(name: &str, average: f64, today: f64) -> Self {
    Self {
      name: name.to_string(),
      average,
      today,
    }
  }

  /// Shown when the backend has no chart rows yet.
  pub fn default_week() -> Vec<ChartPoint> {
    vec![
      Self::new("Mon", 400.0, 240.0),
      Self::new("Tue", 300.0, 139.0),
      Self::new("Wed", 200.0, 980.0),
      Self::new("Thu", 278.0, 390.0),
      Self::new("Fri", 189.0, 480.0),
      Self::new("Sat", 239.0, 380.0),
      Self::new("Sun", 349.0, 430.0),
    ]
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderStats {
  pub total: usize,
  pub pending: usize,
  pub in_progress: usize,
  pub completed: usize,
  pub cancelled: usize,
  pub total_revenue: f64,
}

impl OrderStats {
  pub fn tally(orders: impl IntoIterator<Item = (OrderStatus, f64)>) -> Self {
    orders
      .into_iter()
      .fold(Self::default(), |mut stats, (status, amount)| {
        stats.total += 1;
        stats.total_revenue += amount;
        match status {
          OrderStatus::Pending => stats.pending += 1,
          OrderStatus::InProgress => stats.in_progress += 1,
          OrderStatus::Completed => stats.completed += 1,
          OrderStatus::Cancelled => stats.cancelled += 1,
        }
        stats
      })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
  pub total: usize,
  pub admins: usize,
  pub users: usize,
}

impl UserStats {
  pub fn tally(roles: impl IntoIterator<Item = Role>) -> Self {
    roles
      .into_iter()
      .fold(Self::default(), |mut stats, role| {
        stats.total += 1;
        match role {
          Role::Admin => stats.admins += 1,
          Role::User => stats.users += 1,
        }
        stats
      })
  }
}
