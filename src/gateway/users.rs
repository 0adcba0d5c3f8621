use chrono::Utc;
use uuid::Uuid;

use crate::cache::ResourceKind;
use crate::error::Result;
use crate::model::rows::{
  decode_row, decode_rows, DbProfile, DbProfileInsert, DbProfileUpdate, DbRole,
};
use crate::model::{CreateProfile, Profile, ProfilePatch, Role, UserFilter, UserStats};

use super::rest::{Params, RestGateway};
use super::UsersGateway;

const TABLE: &str = "profiles";
const KIND: ResourceKind = ResourceKind::Users;

const SEARCH_COLUMNS: [&str; 2] = ["email", "full_name"];

impl UsersGateway for RestGateway {
  async fn fetch_users(&self, filter: &UserFilter) -> Result<Vec<Profile>> {
    let filter = filter.normalized();
    let mut params = Params::new().select("*").order("created_at", false);
    if let Some(role) = filter.role {
      params = params.eq("role", role);
    }
    if let Some(term) = &filter.search {
      params = params.search(&SEARCH_COLUMNS, term);
    }
    let rows = self.select(TABLE, &params, KIND).await?;
    decode_rows::<DbProfile, Profile>(rows, "profile")
  }

  async fn fetch_user(&self, id: Uuid) -> Result<Profile> {
    let id = id.to_string();
    let params = Params::new().select("*").eq("id", &id);
    let row = self.select_one(TABLE, &params, KIND, &id).await?;
    decode_row::<DbProfile, Profile>(row, "profile")
  }

  async fn create_user(&self, input: &CreateProfile) -> Result<Profile> {
    input.validate()?;
    let row = self
      .insert(TABLE, &DbProfileInsert::from(input), KIND)
      .await?;
    decode_row::<DbProfile, Profile>(row, "created profile")
  }

  async fn update_user(&self, patch: &ProfilePatch) -> Result<Profile> {
    patch.validate()?;
    let id = patch.id.to_string();
    let params = Params::new().eq("id", &id);
    let body = DbProfileUpdate::new(patch, Utc::now());
    let row = self.update(TABLE, &params, &body, KIND, &id).await?;
    decode_row::<DbProfile, Profile>(row, "updated profile")
  }

  async fn delete_user(&self, id: Uuid) -> Result<()> {
    let id = id.to_string();
    self
      .delete(TABLE, &Params::new().eq("id", &id), KIND, &id)
      .await
  }

  async fn fetch_user_stats(&self) -> Result<UserStats> {
    let rows = self
      .select(TABLE, &Params::new().select("role"), KIND)
      .await?;
    let roles = decode_rows::<DbRole, Role>(rows, "profile role")?;
    Ok(UserStats::tally(roles))
  }
}
