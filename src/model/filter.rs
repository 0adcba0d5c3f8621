//! List filters. A filter both parameterizes the backend query and decides
//! whether an optimistically created entity belongs in a cached list.

use serde::{Deserialize, Serialize};

use super::types::{Order, OrderStatus, Profile, Role};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<OrderStatus>,
  /// Free text matched against client name, project type and id.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
}

impl OrderFilter {
  pub fn status(status: OrderStatus) -> Self {
    Self {
      status: Some(status),
      search: None,
    }
  }

  pub fn search(query: impl Into<String>) -> Self {
    Self {
      status: None,
      search: Some(query.into()),
    }
  }

  /// Trim the search text and drop it when blank.
  pub fn normalized(&self) -> Self {
    Self {
      status: self.status,
      search: normalize_search(self.search.as_deref()),
    }
  }

  pub fn matches(&self, order: &Order) -> bool {
    if let Some(status) = self.status {
      if order.status != status {
        return false;
      }
    }
    match normalize_search(self.search.as_deref()) {
      Some(term) => contains_any(
        &term,
        [
          order.client_name.as_str(),
          order.project_type.as_str(),
          order.id.as_str(),
        ],
      ),
      None => true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
  pub order_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<Role>,
  /// Free text matched against email and full name.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
}

impl UserFilter {
  pub fn role(role: Role) -> Self {
    Self {
      role: Some(role),
      search: None,
    }
  }

  pub fn normalized(&self) -> Self {
    Self {
      role: self.role,
      search: normalize_search(self.search.as_deref()),
    }
  }

  pub fn matches(&self, profile: &Profile) -> bool {
    if let Some(role) = self.role {
      if profile.role != role {
        return false;
      }
    }
    match normalize_search(self.search.as_deref()) {
      Some(term) => contains_any(
        &term,
        [
          profile.email.as_str(),
          profile.full_name.as_deref().unwrap_or_default(),
        ],
      ),
      None => true,
    }
  }
}

fn normalize_search(search: Option<&str>) -> Option<String> {
  search
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
}

/// Case-insensitive substring match, the local equivalent of `ilike '%term%'`.
fn contains_any<'a>(term: &str, fields: impl IntoIterator<Item = &'a str>) -> bool {
  let term = term.to_lowercase();
  fields
    .into_iter()
    .any(|field| field.to_lowercase().contains(&term))
}
