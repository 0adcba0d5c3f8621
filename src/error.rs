//! Error taxonomy shared by the gateways, the cache and the mutation coordinator.

use std::fmt;

use thiserror::Error;

use crate::cache::ResourceKind;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
  /// Input or backend row failed a local schema check. Never retried.
  #[error("{0}")]
  Validation(ValidationErrors),

  #[error("{kind} {id} not found")]
  NotFound { kind: ResourceKind, id: String },

  /// Network or backend failure of any kind, including 401/403.
  #[error("{}", transport_message(.status, .message))]
  Transport { status: Option<u16>, message: String },

  #[error("cache codec error: {0}")]
  Codec(#[from] serde_json::Error),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
  match status {
    Some(code) => format!("{} (HTTP {})", message, code),
    None => message.to_string(),
  }
}

impl SyncError {
  pub fn transport(message: impl Into<String>) -> Self {
    Self::Transport {
      status: None,
      message: message.into(),
    }
  }

  pub fn not_found(kind: ResourceKind, id: impl fmt::Display) -> Self {
    Self::NotFound {
      kind,
      id: id.to_string(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound { .. })
  }

  pub fn is_validation(&self) -> bool {
    matches!(self, Self::Validation(_))
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(err: reqwest::Error) -> Self {
    Self::Transport {
      status: err.status().map(|s| s.as_u16()),
      message: err.to_string(),
    }
  }
}

impl From<ValidationErrors> for SyncError {
  fn from(errors: ValidationErrors) -> Self {
    Self::Validation(errors)
  }
}

/// A single failed field check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  pub field: String,
  pub message: String,
}

/// All field failures of one validation pass, with the thing being validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
  pub context: String,
  pub fields: Vec<FieldError>,
}

impl ValidationErrors {
  pub fn new(context: impl Into<String>) -> Self {
    Self {
      context: context.into(),
      fields: Vec::new(),
    }
  }

  pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
    self.fields.push(FieldError {
      field: field.into(),
      message: message.into(),
    });
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  /// Message for the given field, if it failed.
  pub fn field(&self, name: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|f| f.field == name)
      .map(|f| f.message.as_str())
  }

  /// `Ok(())` when nothing failed, otherwise the collected errors.
  pub fn into_result(self) -> Result<()> {
    if self.is_empty() {
      Ok(())
    } else {
      Err(SyncError::Validation(self))
    }
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Validation failed for {}", self.context)?;
    for (i, field) in self.fields.iter().enumerate() {
      let sep = if i == 0 { ": " } else { ", " };
      write!(f, "{}{}: {}", sep, field.field, field.message)?;
    }
    Ok(())
  }
}
