//! REST transport shared by every resource gateway.
//!
//! The backend exposes one endpoint per table under `/rest/v1/` and takes
//! filters as query parameters (`status=eq.Pending`, `order=created_at.desc`).
//! Responses are JSON arrays of rows; writes ask for the written rows back.

use std::fmt;
use std::time::Duration;

use color_eyre::eyre::eyre;
use reqwest::{header, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cache::ResourceKind;
use crate::config::Config;
use crate::error::{Result, SyncError};

/// Error code the backend uses when a single-row request matched nothing.
const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Clone)]
pub struct Credentials {
  pub api_key: String,
  /// Session token of the signed-in user. Requests fall back to the API key.
  pub access_token: Option<String>,
}

impl Credentials {
  fn bearer(&self) -> &str {
    self.access_token.as_deref().unwrap_or(&self.api_key)
  }
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("api_key", &"<redacted>")
      .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

/// Backend client implementing every gateway trait.
#[derive(Clone, Debug)]
pub struct RestGateway {
  http: reqwest::Client,
  rest_url: Url,
  credentials: Credentials,
}

impl RestGateway {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let credentials = Credentials {
      api_key: Config::get_api_key()?,
      access_token: Config::get_access_token(),
    };
    Self::connect(config.backend_url()?, credentials, config.backend.timeout())
      .map_err(|e| eyre!("Failed to create backend client: {}", e))
  }

  pub fn connect(base: Url, credentials: Credentials, timeout: Duration) -> Result<Self> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self {
      http,
      rest_url: rest_url(base)?,
      credentials,
    })
  }

  fn table_url(&self, table: &str) -> Result<Url> {
    self
      .rest_url
      .join(table)
      .map_err(|e| SyncError::transport(format!("Invalid table url for {}: {}", table, e)))
  }

  async fn send(
    &self,
    method: Method,
    table: &str,
    params: &Params,
    body: Option<Value>,
    target: Target<'_>,
  ) -> Result<Vec<Value>> {
    let url = self.table_url(table)?;
    debug!(%method, table, params = %params, "backend request");

    let mut request = self
      .http
      .request(method.clone(), url)
      .query(params.pairs())
      .header("apikey", &self.credentials.api_key)
      .bearer_auth(self.credentials.bearer())
      .header(header::ACCEPT, "application/json");
    if method != Method::GET {
      request = request.header("Prefer", "return=representation");
    }
    if let Some(body) = body {
      request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
      warn!(%method, table, error = %e, "backend unreachable");
      SyncError::from(e)
    })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let err = error_from_response(status.as_u16(), &body, target);
      warn!(%method, table, error = %err, "backend request failed");
      return Err(err);
    }

    let rows: Vec<Value> = response.json().await?;
    debug!(%method, table, rows = rows.len(), "backend response");
    Ok(rows)
  }

  pub(crate) async fn select(
    &self,
    table: &str,
    params: &Params,
    kind: ResourceKind,
  ) -> Result<Vec<Value>> {
    self
      .send(Method::GET, table, params, None, Target { kind, id: None })
      .await
  }

  /// Exactly one row, or not-found.
  pub(crate) async fn select_one(
    &self,
    table: &str,
    params: &Params,
    kind: ResourceKind,
    id: &str,
  ) -> Result<Value> {
    let target = Target { kind, id: Some(id) };
    let rows = self.send(Method::GET, table, params, None, target).await?;
    first_row(rows, target)
  }

  pub(crate) async fn insert<B: Serialize>(
    &self,
    table: &str,
    body: &B,
    kind: ResourceKind,
  ) -> Result<Value> {
    let body = serde_json::to_value(body)?;
    let target = Target { kind, id: None };
    let rows = self
      .send(Method::POST, table, &Params::new(), Some(body), target)
      .await?;
    rows
      .into_iter()
      .next()
      .ok_or_else(|| SyncError::transport(format!("Backend returned no {} after insert", kind)))
  }

  /// Patch the row matching `params`. Not-found when nothing matched.
  pub(crate) async fn update<B: Serialize>(
    &self,
    table: &str,
    params: &Params,
    body: &B,
    kind: ResourceKind,
    id: &str,
  ) -> Result<Value> {
    let body = serde_json::to_value(body)?;
    let target = Target { kind, id: Some(id) };
    let rows = self
      .send(Method::PATCH, table, params, Some(body), target)
      .await?;
    first_row(rows, target)
  }

  /// Delete the rows matching `params`. Not-found when nothing was deleted.
  pub(crate) async fn delete(
    &self,
    table: &str,
    params: &Params,
    kind: ResourceKind,
    id: &str,
  ) -> Result<()> {
    let target = Target { kind, id: Some(id) };
    let rows = self
      .send(Method::DELETE, table, params, None, target)
      .await?;
    if rows.is_empty() {
      return Err(SyncError::not_found(kind, id));
    }
    Ok(())
  }
}

fn rest_url(mut base: Url) -> Result<Url> {
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  base
    .join("rest/v1/")
    .map_err(|e| SyncError::transport(format!("Invalid backend url: {}", e)))
}

/// What a request is about, for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target<'a> {
  kind: ResourceKind,
  id: Option<&'a str>,
}

fn first_row(rows: Vec<Value>, target: Target<'_>) -> Result<Value> {
  rows
    .into_iter()
    .next()
    .ok_or_else(|| SyncError::not_found(target.kind, target.id.unwrap_or_default()))
}

/// Error body returned by the backend.
#[derive(Debug, Default, Deserialize)]
struct ApiError {
  code: Option<String>,
  message: Option<String>,
  details: Option<String>,
}

fn error_from_response(status: u16, body: &str, target: Target<'_>) -> SyncError {
  let api: ApiError = serde_json::from_str(body).unwrap_or_default();

  if let (Some(code), Some(id)) = (api.code.as_deref(), target.id) {
    if code == NO_ROWS_CODE {
      return SyncError::not_found(target.kind, id);
    }
  }

  let mut message = match api.message {
    Some(message) => message,
    None if !body.trim().is_empty() => body.trim().to_string(),
    None => format!("Request for {} failed", target.kind),
  };
  if let Some(details) = api.details.filter(|d| !d.is_empty()) {
    message = format!("{} ({})", message, details);
  }
  SyncError::Transport {
    status: Some(status),
    message,
  }
}

/// Query parameters of one backend request, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Params {
  pairs: Vec<(String, String)>,
}

impl Params {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  fn push(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.pairs.push((key.into(), value.into()));
    self
  }

  pub(crate) fn select(self, columns: &str) -> Self {
    self.push("select", columns)
  }

  pub(crate) fn eq(self, column: &str, value: impl fmt::Display) -> Self {
    self.push(column, format!("eq.{}", value))
  }

  /// Case-insensitive substring match on any of `columns`.
  pub(crate) fn search(self, columns: &[&str], term: &str) -> Self {
    let pattern = quote(&format!("*{}*", term));
    let clauses: Vec<String> = columns
      .iter()
      .map(|column| format!("{}.ilike.{}", column, pattern))
      .collect();
    self.push("or", format!("({})", clauses.join(",")))
  }

  pub(crate) fn order(self, column: &str, ascending: bool) -> Self {
    let direction = if ascending { "asc" } else { "desc" };
    self.push("order", format!("{}.{}", column, direction))
  }

  pub(crate) fn limit(self, limit: usize) -> Self {
    self.push("limit", limit.to_string())
  }

  pub(crate) fn pairs(&self) -> &[(String, String)] {
    &self.pairs
  }
}

impl fmt::Display for Params {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, (key, value)) in self.pairs.iter().enumerate() {
      if i > 0 {
        f.write_str("&")?;
      }
      write!(f, "{}={}", key, value)?;
    }
    Ok(())
  }
}

/// Quote a value for use inside a logical filter, where commas and
/// parentheses are otherwise syntax.
fn quote(value: &str) -> String {
  let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
  format!("\"{}\"", escaped)
}
