use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::mutation::{Action, MutationPlan};
use super::Dashboard;
use crate::cache::{CacheResult, CacheStore, KeyPrefix, Operation, QueryKey, ResourceKind};
use crate::error::Result;
use crate::gateway::UsersGateway;
use crate::model::{CreateProfile, Profile, ProfilePatch, Role, UserFilter, UserStats};
use crate::query::Query;

const KIND: ResourceKind = ResourceKind::Users;

fn user_lists() -> KeyPrefix {
  KeyPrefix::Operation(KIND, Operation::List)
}

fn stats() -> KeyPrefix {
  KeyPrefix::Operation(KIND, Operation::Stats)
}

impl<G: UsersGateway> Dashboard<G> {
  pub async fn list_users(&self, filter: &UserFilter) -> Result<CacheResult<Vec<Profile>>> {
    let key = QueryKey::user_list(filter);
    self
      .client
      .fetch(&key, || self.gateway.fetch_users(filter))
      .await
  }

  pub async fn user(&self, id: Uuid) -> Result<CacheResult<Profile>> {
    let key = QueryKey::user_detail(id);
    self.client.fetch(&key, || self.gateway.fetch_user(id)).await
  }

  pub async fn user_stats(&self) -> Result<CacheResult<UserStats>> {
    let key = QueryKey::user_stats();
    self
      .client
      .fetch(&key, || self.gateway.fetch_user_stats())
      .await
  }

  pub fn observe_users(&self, filter: &UserFilter) -> Query<Vec<Profile>> {
    let gateway = Arc::clone(&self.gateway);
    let filter = filter.normalized();
    self.client.observe(QueryKey::user_list(&filter), move || {
      let gateway = Arc::clone(&gateway);
      let filter = filter.clone();
      async move { gateway.fetch_users(&filter).await }
    })
  }

  pub fn observe_user(&self, id: Uuid) -> Query<Profile> {
    let gateway = Arc::clone(&self.gateway);
    self.client.observe(QueryKey::user_detail(id), move || {
      let gateway = Arc::clone(&gateway);
      async move { gateway.fetch_user(id).await }
    })
  }

  pub fn observe_user_stats(&self) -> Query<UserStats> {
    let gateway = Arc::clone(&self.gateway);
    self.client.observe(QueryKey::user_stats(), move || {
      let gateway = Arc::clone(&gateway);
      async move { gateway.fetch_user_stats().await }
    })
  }

  /// Create the profile row for an account that already exists with the
  /// auth provider, so the id is known up front.
  pub async fn create_user(&self, input: &CreateProfile) -> Result<Profile> {
    let plan =
      MutationPlan::new(KIND, Action::Create, &input.email).affects(KeyPrefix::Kind(KIND));
    if let Err(err) = input.validate() {
      return Err(self.coordinator.reject(&plan, err));
    }

    let expected = input.to_placeholder(Utc::now());
    self
      .coordinator
      .run(
        plan,
        |store| insert_user(store, &expected),
        || self.gateway.create_user(input),
        |store, created| replace_user(store, created),
      )
      .await
  }

  pub async fn update_user(&self, patch: &ProfilePatch) -> Result<Profile> {
    let plan = MutationPlan::new(KIND, Action::Update, patch.id).affects(KeyPrefix::Kind(KIND));
    if let Err(err) = patch.validate() {
      return Err(self.coordinator.reject(&plan, err));
    }

    self
      .coordinator
      .run(
        plan,
        |store| patch_user(store, patch),
        || self.gateway.update_user(patch),
        |store, updated| replace_user(store, updated),
      )
      .await
  }

  pub async fn set_user_role(&self, id: Uuid, role: Role) -> Result<Profile> {
    self.update_user(&ProfilePatch::role(id, role)).await
  }

  /// Delete a profile. Deleting one that is already gone succeeds.
  pub async fn delete_user(&self, id: Uuid) -> Result<()> {
    let plan = MutationPlan::new(KIND, Action::Delete, id).affects(KeyPrefix::Kind(KIND));
    self
      .coordinator
      .run(
        plan,
        |store| remove_user(store, id),
        || async {
          match self.gateway.delete_user(id).await {
            Err(err) if err.is_not_found() => {
              debug!(user = %id, "user already deleted");
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

fn cached_user(store: &CacheStore, id: Uuid) -> Option<Profile> {
  if let Ok(Some(profile)) = store.get_data::<Profile>(&QueryKey::user_detail(id)) {
    return Some(profile);
  }
  store.entries(&user_lists()).into_iter().find_map(|(_, entry)| {
    let list = entry.decode::<Vec<Profile>>().ok().flatten()?;
    list.into_iter().find(|u| u.id == id)
  })
}

fn belongs(key: &QueryKey, profile: &Profile) -> bool {
  key
    .params::<UserFilter>()
    .is_some_and(|filter| filter.matches(profile))
}

/// Lists are newest first.
fn insert_by_created(list: &mut Vec<Profile>, profile: Profile) {
  let pos = list
    .iter()
    .position(|u| u.created_at < profile.created_at)
    .unwrap_or(list.len());
  list.insert(pos, profile);
}

fn count_role(stats: &mut UserStats, role: Role) {
  stats.total += 1;
  match role {
    Role::Admin => stats.admins += 1,
    Role::User => stats.users += 1,
  }
}

fn uncount_role(stats: &mut UserStats, role: Role) {
  stats.total = stats.total.saturating_sub(1);
  match role {
    Role::Admin => stats.admins = stats.admins.saturating_sub(1),
    Role::User => stats.users = stats.users.saturating_sub(1),
  }
}

fn insert_user(store: &CacheStore, profile: &Profile) -> Result<()> {
  store.update::<Vec<Profile>, _>(&user_lists(), |key, list| {
    if belongs(key, profile) && !list.iter().any(|u| u.id == profile.id) {
      insert_by_created(list, profile.clone());
    }
  })?;
  store.update::<UserStats, _>(&stats(), |_, stats| count_role(stats, profile.role))?;
  Ok(())
}

fn patch_user(store: &CacheStore, patch: &ProfilePatch) -> Result<()> {
  let now = Utc::now();
  let current = cached_user(store, patch.id);
  let updated = current.clone().map(|mut profile| {
    patch.apply_to(&mut profile, now);
    profile
  });

  store.update::<Profile, _>(
    &KeyPrefix::Exact(QueryKey::user_detail(patch.id)),
    |_, profile| patch.apply_to(profile, now),
  )?;
  // A role change can move a profile between role-filtered lists.
  store.update::<Vec<Profile>, _>(&user_lists(), |key, list| {
    match list.iter().position(|u| u.id == patch.id) {
      Some(pos) => {
        patch.apply_to(&mut list[pos], now);
        if !belongs(key, &list[pos]) {
          list.remove(pos);
        }
      }
      None => {
        if let Some(profile) = updated.as_ref().filter(|u| belongs(key, u)) {
          insert_by_created(list, profile.clone());
        }
      }
    }
  })?;
  if let (Some(before), Some(after)) = (&current, &updated) {
    if before.role != after.role {
      store.update::<UserStats, _>(&stats(), |_, stats| {
        uncount_role(stats, before.role);
        count_role(stats, after.role);
      })?;
    }
  }
  Ok(())
}

fn replace_user(store: &CacheStore, profile: &Profile) -> Result<()> {
  store.update::<Vec<Profile>, _>(&user_lists(), |key, list| {
    if let Some(pos) = list.iter().position(|u| u.id == profile.id) {
      if belongs(key, profile) {
        list[pos] = profile.clone();
      } else {
        list.remove(pos);
      }
    }
  })?;
  store.set(&QueryKey::user_detail(profile.id), profile)
}

fn remove_user(store: &CacheStore, id: Uuid) -> Result<()> {
  let current = cached_user(store, id);
  store.update::<Vec<Profile>, _>(&user_lists(), |_, list| list.retain(|u| u.id != id))?;
  if let Some(profile) = &current {
    store.update::<UserStats, _>(&stats(), |_, stats| uncount_role(stats, profile.role))?;
  }
  store.remove(&QueryKey::user_detail(id));
  Ok(())
}
