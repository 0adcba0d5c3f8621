//! Optimistic mutation protocol.
//!
//! Every write goes through [`Coordinator::run`]:
//!
//! 1. wait for the previous mutation of the same resource kind to settle
//! 2. abort background refetches of the affected keys
//! 3. snapshot every entry under the affected prefixes
//! 4. apply the expected result to the cache
//! 5. call the backend
//! 6. on success write the authoritative values and invalidate, on failure
//!    restore the snapshot exactly and restart the refetches aborted in step 2
//!
//! Mutations are never retried and cannot be cancelled once started.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::cache::{CacheStore, KeyPrefix, QueryClient, ResourceKind};
use crate::error::{Result, SyncError};
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Create,
  Update,
  Delete,
}

impl Action {
  fn verb(&self) -> &'static str {
    match self {
      Self::Create => "create",
      Self::Update => "update",
      Self::Delete => "delete",
    }
  }

  fn past(&self) -> &'static str {
    match self {
      Self::Create => "created",
      Self::Update => "updated",
      Self::Delete => "deleted",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Success,
  Error,
}

/// Where a mutation is in its lifecycle. Both settled states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
  Idle,
  Optimistic,
  Settled(Outcome),
}

impl MutationPhase {
  pub fn can_advance_to(&self, next: MutationPhase) -> bool {
    matches!(
      (self, next),
      (Self::Idle, Self::Optimistic)
        | (Self::Idle, Self::Settled(Outcome::Error))
        | (Self::Optimistic, Self::Settled(_))
    )
  }

  pub fn is_settled(&self) -> bool {
    matches!(self, Self::Settled(_))
  }
}

/// What a mutation touches and how it is described to the user.
#[derive(Debug, Clone)]
pub struct MutationPlan {
  pub kind: ResourceKind,
  pub action: Action,
  /// Human-readable name of the entity, e.g. an order id.
  pub subject: String,
  /// Every key the optimistic write may change.
  pub affected: Vec<KeyPrefix>,
}

impl MutationPlan {
  pub fn new(kind: ResourceKind, action: Action, subject: impl fmt::Display) -> Self {
    Self {
      kind,
      action,
      subject: subject.to_string(),
      affected: Vec::new(),
    }
  }

  pub fn affects(mut self, prefix: KeyPrefix) -> Self {
    self.affected.push(prefix);
    self
  }

  fn success_title(&self) -> String {
    format!("{} {}", capitalize(&self.kind.to_string()), self.action.past())
  }

  fn failure_title(&self) -> String {
    format!("Failed to {} {}", self.action.verb(), self.kind)
  }
}

impl fmt::Display for MutationPlan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.action.verb(), self.kind, self.subject)
  }
}

fn capitalize(s: &str) -> String {
  let mut chars = s.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

/// One mutation moving through its phases.
struct Mutation<'a> {
  plan: &'a MutationPlan,
  phase: MutationPhase,
}

impl<'a> Mutation<'a> {
  fn new(plan: &'a MutationPlan) -> Self {
    Self {
      plan,
      phase: MutationPhase::Idle,
    }
  }

  fn enter(&mut self, next: MutationPhase) {
    debug_assert!(
      self.phase.can_advance_to(next),
      "illegal mutation transition {:?} -> {:?}",
      self.phase,
      next
    );
    debug!(mutation = %self.plan, from = ?self.phase, to = ?next, "mutation phase");
    self.phase = next;
  }
}

/// Runs mutations against the shared cache.
///
/// Mutations of the same resource kind are queued: a second one waits until
/// the first has settled before it takes its snapshot, so a rollback always
/// restores the state from before that mutation alone.
#[derive(Clone)]
pub struct Coordinator {
  client: QueryClient,
  notifier: Notifier,
  queues: Arc<Mutex<HashMap<ResourceKind, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Coordinator {
  pub fn new(client: QueryClient, notifier: Notifier) -> Self {
    Self {
      client,
      notifier,
      queues: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn client(&self) -> &QueryClient {
    &self.client
  }

  fn queue(&self, kind: ResourceKind) -> Arc<tokio::sync::Mutex<()>> {
    let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(queues.entry(kind).or_default())
  }

  /// Report input that failed validation. The cache is never touched.
  pub fn reject(&self, plan: &MutationPlan, err: SyncError) -> SyncError {
    let mut mutation = Mutation::new(plan);
    mutation.enter(MutationPhase::Settled(Outcome::Error));
    warn!(mutation = %plan, error = %err, "mutation rejected");
    self.notifier.error(plan.failure_title(), err.to_string());
    err
  }

  /// Run one mutation.
  ///
  /// `apply` writes the expected result into the cache, `remote` performs the
  /// backend call and `settle` writes the authoritative result back.
  pub async fn run<T, A, R, Fut, S>(
    &self,
    plan: MutationPlan,
    apply: A,
    remote: R,
    settle: S,
  ) -> Result<T>
  where
    A: FnOnce(&CacheStore) -> Result<()>,
    R: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: FnOnce(&CacheStore, &T) -> Result<()>,
  {
    let queue = self.queue(plan.kind);
    let _turn = queue.lock().await;
    let mut mutation = Mutation::new(&plan);
    let store = self.client.store();

    let mut cancelled = Vec::new();
    for prefix in &plan.affected {
      let keys = self.client.cancel(prefix);
      if !keys.is_empty() {
        debug!(prefix = %prefix, cancelled = keys.len(), "cancelled refetches before mutation");
      }
      cancelled.extend(keys);
    }
    let snapshot = store.snapshot(&plan.affected);

    mutation.enter(MutationPhase::Optimistic);
    let result = match apply(store) {
      Ok(()) => remote().await,
      Err(err) => Err(err),
    };

    match result {
      Ok(value) => {
        if let Err(err) = settle(store, &value) {
          warn!(mutation = %plan, error = %err, "could not write result to cache");
        }
        for prefix in &plan.affected {
          self.client.invalidate(prefix);
        }
        mutation.enter(MutationPhase::Settled(Outcome::Success));
        info!(mutation = %plan, "mutation succeeded");
        self.notifier.success(plan.success_title(), plan.subject.clone());
        Ok(value)
      }
      Err(err) => {
        store.restore(snapshot);
        // Refetches aborted for this mutation were still owed to their observers.
        for key in &cancelled {
          self.client.refetch(key);
        }
        mutation.enter(MutationPhase::Settled(Outcome::Error));
        warn!(mutation = %plan, error = %err, "mutation failed, cache rolled back");
        self.notifier.error(plan.failure_title(), err.to_string());
        Err(err)
      }
    }
  }
}
