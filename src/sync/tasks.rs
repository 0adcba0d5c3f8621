use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::mutation::{Action, MutationPlan};
use super::Dashboard;
use crate::cache::{CacheResult, CacheStore, KeyPrefix, Operation, QueryKey, ResourceKind};
use crate::error::Result;
use crate::gateway::TasksGateway;
use crate::model::{CreateTask, Task, TaskFilter, TaskId, TaskPatch, TaskStatus};
use crate::query::Query;

const KIND: ResourceKind = ResourceKind::Tasks;

/// Task mutations only know a task's id, so they cover every cached task list.
fn task_lists() -> KeyPrefix {
  KeyPrefix::Operation(KIND, Operation::List)
}

impl<G: TasksGateway> Dashboard<G> {
  /// Tasks of one order, oldest first.
  pub async fn list_tasks(&self, order_id: &str) -> Result<CacheResult<Vec<Task>>> {
    let filter = TaskFilter {
      order_id: order_id.to_string(),
    };
    self
      .client
      .fetch(&QueryKey::task_list(order_id), || {
        self.gateway.fetch_tasks(&filter)
      })
      .await
  }

  pub fn observe_tasks(&self, order_id: &str) -> Query<Vec<Task>> {
    let gateway = Arc::clone(&self.gateway);
    let filter = TaskFilter {
      order_id: order_id.to_string(),
    };
    self.client.observe(QueryKey::task_list(order_id), move || {
      let gateway = Arc::clone(&gateway);
      let filter = filter.clone();
      async move { gateway.fetch_tasks(&filter).await }
    })
  }

  pub async fn create_task(&self, input: &CreateTask) -> Result<Task> {
    let list = QueryKey::task_list(&input.order_id);
    let plan =
      MutationPlan::new(KIND, Action::Create, &input.text).affects(KeyPrefix::Exact(list.clone()));
    if let Err(err) = input.validate() {
      return Err(self.coordinator.reject(&plan, err));
    }

    let placeholder = input.to_placeholder(Utc::now());
    self
      .coordinator
      .run(
        plan,
        |store| {
          store.update::<Vec<Task>, _>(&KeyPrefix::Exact(list.clone()), |_, tasks| {
            tasks.push(placeholder.clone());
          })?;
          Ok(())
        },
        || self.gateway.create_task(input),
        |store, created| replace_task(store, &placeholder.id, created),
      )
      .await
  }

  pub async fn update_task(&self, patch: &TaskPatch) -> Result<Task> {
    let plan = MutationPlan::new(KIND, Action::Update, &patch.id).affects(task_lists());
    if let Err(err) = patch.validate() {
      return Err(self.coordinator.reject(&plan, err));
    }

    self
      .coordinator
      .run(
        plan,
        |store| patch_tasks(store, std::slice::from_ref(patch)),
        || self.gateway.update_task(patch),
        |store, updated| replace_task(store, &updated.id, updated),
      )
      .await
  }

  pub async fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task> {
    self.update_task(&TaskPatch::status(id, status)).await
  }

  /// Apply several patches as one mutation: all of them show at once and all
  /// of them roll back if any fails.
  pub async fn update_tasks(&self, patches: &[TaskPatch]) -> Result<Vec<Task>> {
    let subject = format!("{} tasks", patches.len());
    let plan = MutationPlan::new(KIND, Action::Update, subject).affects(task_lists());
    if let Some(err) = patches.iter().find_map(|p| p.validate().err()) {
      return Err(self.coordinator.reject(&plan, err));
    }

    self
      .coordinator
      .run(
        plan,
        |store| patch_tasks(store, patches),
        || self.gateway.update_tasks(patches),
        |store, updated| {
          for task in updated {
            replace_task(store, &task.id, task)?;
          }
          Ok(())
        },
      )
      .await
  }

  /// Delete a task. Deleting a task that is already gone succeeds.
  pub async fn delete_task(&self, id: &TaskId) -> Result<()> {
    let plan = MutationPlan::new(KIND, Action::Delete, id).affects(task_lists());
    self
      .coordinator
      .run(
        plan,
        |store| {
          store.update::<Vec<Task>, _>(&task_lists(), |_, tasks| {
            tasks.retain(|t| &t.id != id)
          })?;
          Ok(())
        },
        || async {
          match self.gateway.delete_task(id).await {
            Err(err) if err.is_not_found() => {
              debug!(task = %id, "task already deleted");
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

fn patch_tasks(store: &CacheStore, patches: &[TaskPatch]) -> Result<()> {
  store.update::<Vec<Task>, _>(&task_lists(), |_, tasks| {
    for patch in patches {
      if let Some(task) = tasks.iter_mut().find(|t| t.id == patch.id) {
        patch.apply_to(task);
      }
    }
  })?;
  Ok(())
}

/// Write the backend's copy of a task over the cached one stored under `id`.
fn replace_task(store: &CacheStore, id: &TaskId, task: &Task) -> Result<()> {
  store.update::<Vec<Task>, _>(&task_lists(), |_, tasks| {
    if let Some(slot) = tasks.iter_mut().find(|t| &t.id == id) {
      *slot = task.clone();
    }
  })?;
  Ok(())
}
