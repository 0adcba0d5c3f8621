use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{CachePolicy, KeyPrefix, Operation, ResourceKind};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL of the hosted backend; tables live under `/rest/v1/`
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

impl BackendConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

/// Freshness and retention of cached query results, in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
  pub stale_secs: u64,
  pub gc_secs: u64,
  pub order_list_stale_secs: u64,
  pub order_stats_stale_secs: u64,
  pub users_stale_secs: u64,
  pub chart_stale_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: 0,
      gc_secs: 600,
      order_list_stale_secs: 30,
      order_stats_stale_secs: 60,
      users_stale_secs: 300,
      chart_stale_secs: 300,
    }
  }
}

/// Upper bound for every cache duration: ten years.
const MAX_CACHE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn cache_duration(secs: u64) -> chrono::Duration {
  i64::try_from(secs.min(MAX_CACHE_SECS))
    .ok()
    .and_then(chrono::Duration::try_seconds)
    .unwrap_or_else(chrono::Duration::zero)
}

impl CacheConfig {
  fn fields(&self) -> [(&'static str, u64); 6] {
    [
      ("stale_secs", self.stale_secs),
      ("gc_secs", self.gc_secs),
      ("order_list_stale_secs", self.order_list_stale_secs),
      ("order_stats_stale_secs", self.order_stats_stale_secs),
      ("users_stale_secs", self.users_stale_secs),
      ("chart_stale_secs", self.chart_stale_secs),
    ]
  }

  /// Reject durations too large to represent.
  pub fn validate(&self) -> Result<()> {
    match self.fields().into_iter().find(|(_, secs)| *secs > MAX_CACHE_SECS) {
      Some((name, secs)) => Err(eyre!(
        "cache.{} is {} seconds; the maximum is {}",
        name,
        secs,
        MAX_CACHE_SECS
      )),
      None => Ok(()),
    }
  }

  /// Out-of-range values are clamped; [`CacheConfig::validate`] rejects them
  /// at load time.
  pub fn policy(&self) -> CachePolicy {
    let secs = cache_duration;
    CachePolicy {
      stale_time: secs(self.stale_secs),
      gc_time: secs(self.gc_secs),
      overrides: Vec::new(),
    }
    .with_override(
      KeyPrefix::Operation(ResourceKind::Orders, Operation::List),
      secs(self.order_list_stale_secs),
    )
    .with_override(
      KeyPrefix::Operation(ResourceKind::Orders, Operation::Stats),
      secs(self.order_stats_stale_secs),
    )
    .with_override(KeyPrefix::Kind(ResourceKind::Users), secs(self.users_stale_secs))
    .with_override(KeyPrefix::Kind(ResourceKind::ChartData), secs(self.chart_stale_secs))
  }

  /// How often idle entries are swept.
  pub fn gc_interval(&self) -> Duration {
    Duration::from_secs((self.gc_secs / 2).max(1))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./orderdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/orderdesk/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/orderdesk/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("orderdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("orderdesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    config.backend_url()?;
    config
      .cache
      .validate()
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;
    Ok(config)
  }

  /// The backend URL, parsed.
  pub fn backend_url(&self) -> Result<Url> {
    let url = Url::parse(&self.backend.url)
      .map_err(|e| eyre!("Invalid backend url {:?}: {}", self.backend.url, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!("Backend url must be http(s): {}", url));
    }
    Ok(url)
  }

  /// Get the backend API key from environment variables.
  ///
  /// Checks ORDERDESK_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("ORDERDESK_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Backend API key not found. Set ORDERDESK_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Session token of the signed-in user, if one was provided.
  ///
  /// Without it requests are made with the API key alone.
  pub fn get_access_token() -> Option<String> {
    std::env::var("ORDERDESK_ACCESS_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
