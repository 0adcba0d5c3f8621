//! Resource synchronization: cached reads and optimistic writes per resource
//! kind, built on the query client and the mutation coordinator.

use std::sync::Arc;

use crate::cache::QueryClient;
use crate::notify::Notifier;

mod chart;
mod mutation;
mod orders;
mod tasks;
mod users;

pub use mutation::{Action, Coordinator, MutationPhase, MutationPlan, Outcome};

/// Everything a front end needs to read and write dashboard data.
///
/// `G` is the backend; read and write operations are available for each
/// gateway trait it implements.
pub struct Dashboard<G> {
  gateway: Arc<G>,
  client: QueryClient,
  coordinator: Coordinator,
}

impl<G> Clone for Dashboard<G> {
  fn clone(&self) -> Self {
    Self {
      gateway: Arc::clone(&self.gateway),
      client: self.client.clone(),
      coordinator: self.coordinator.clone(),
    }
  }
}

impl<G> Dashboard<G> {
  pub fn new(gateway: Arc<G>, client: QueryClient, notifier: Notifier) -> Self {
    let coordinator = Coordinator::new(client.clone(), notifier);
    Self {
      gateway,
      client,
      coordinator,
    }
  }

  pub fn client(&self) -> &QueryClient {
    &self.client
  }

  pub fn gateway(&self) -> &Arc<G> {
    &self.gateway
  }
}
