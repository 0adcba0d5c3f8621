//! Data model: entities, filters, write inputs and backend rows.

mod filter;
mod input;
pub mod rows;
mod types;
pub mod validate;

pub use filter::{OrderFilter, TaskFilter, UserFilter};
pub use input::{CreateOrder, CreateProfile, CreateTask, OrderPatch, ProfilePatch, TaskPatch};
pub use types::{
  is_placeholder, placeholder_id, ChartPoint, Order, OrderStats, OrderStatus, Profile, Role, Task,
  TaskId, TaskStatus, UserStats,
};
