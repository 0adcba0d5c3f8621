mod app;
mod commands;

use clap::Parser;
use color_eyre::Result;
use orderdesk::{config, logging};

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let cli = commands::Cli::parse();

  // Keep the guard alive so buffered log lines are flushed on exit
  let _log_guard = logging::init()?;

  let config = config::Config::load(cli.config.as_deref())?;

  let mut app = app::App::new(&config)?;
  app.run(cli.command).await?;

  Ok(())
}
