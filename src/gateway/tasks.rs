use futures::future::try_join_all;

use crate::cache::ResourceKind;
use crate::error::{Result, SyncError};
use crate::model::rows::{decode_row, decode_rows, DbTask, DbTaskInsert, DbTaskUpdate};
use crate::model::{CreateTask, Task, TaskFilter, TaskId, TaskPatch};

use super::rest::{Params, RestGateway};
use super::TasksGateway;

const TABLE: &str = "tasks";
const KIND: ResourceKind = ResourceKind::Tasks;

/// Placeholder ids only exist in the cache; the backend cannot have them.
fn backend_id(id: &TaskId) -> Result<String> {
  match id {
    TaskId::Text(text) if crate::model::is_placeholder(text) => {
      Err(SyncError::not_found(KIND, id))
    }
    _ => Ok(id.to_string()),
  }
}

impl TasksGateway for RestGateway {
  async fn fetch_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
    let params = Params::new()
      .select("*")
      .eq("order_id", &filter.order_id)
      .order("created_at", true);
    let rows = self.select(TABLE, &params, KIND).await?;
    decode_rows::<DbTask, Task>(rows, "task")
  }

  async fn fetch_task(&self, id: &TaskId) -> Result<Task> {
    let id = backend_id(id)?;
    let params = Params::new().select("*").eq("id", &id);
    let row = self.select_one(TABLE, &params, KIND, &id).await?;
    decode_row::<DbTask, Task>(row, "task")
  }

  async fn create_task(&self, input: &CreateTask) -> Result<Task> {
    input.validate()?;
    let row = self
      .insert(TABLE, &DbTaskInsert::from(input), KIND)
      .await?;
    decode_row::<DbTask, Task>(row, "created task")
  }

  async fn update_task(&self, patch: &TaskPatch) -> Result<Task> {
    patch.validate()?;
    let id = backend_id(&patch.id)?;
    let params = Params::new().eq("id", &id);
    let row = self
      .update(TABLE, &params, &DbTaskUpdate::from(patch), KIND, &id)
      .await?;
    decode_row::<DbTask, Task>(row, "updated task")
  }

  async fn delete_task(&self, id: &TaskId) -> Result<()> {
    let id = backend_id(id)?;
    self
      .delete(TABLE, &Params::new().eq("id", &id), KIND, &id)
      .await
  }

  async fn update_tasks(&self, patches: &[TaskPatch]) -> Result<Vec<Task>> {
    for patch in patches {
      patch.validate()?;
    }
    try_join_all(patches.iter().map(|patch| self.update_task(patch))).await
  }
}
