//! File logging. The CLI owns stdout, so diagnostics go to a log file under
//! the user's data directory.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `orderdesk=debug`.
pub const LOG_ENV: &str = "ORDERDESK_LOG";

const LOG_FILE: &str = "orderdesk.log";

pub fn log_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|d| d.join("orderdesk"))
    .ok_or_else(|| eyre!("Could not determine data directory"))
}

/// Install the global subscriber. Logs are flushed when the returned guard
/// is dropped, so keep it alive for the whole run.
pub fn init() -> Result<WorkerGuard> {
  let dir = log_dir()?;
  std::fs::create_dir_all(&dir)?;

  let appender = tracing_appender::rolling::daily(&dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
  let fmt_layer = tracing_subscriber::fmt::layer()
    .with_writer(writer)
    .with_ansi(false);
  tracing_subscriber::registry()
    .with(filter)
    .with(fmt_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
