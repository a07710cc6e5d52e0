//! Validator Version Sync CLI
//!
//! Loads the configuration, installs logging and hands control to the sync
//! manager, either for one attempt or on a fixed interval.

mod cli;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;
use vsync_core::config::LOG_LEVELS;
use vsync_core::{Config, Manager};

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config_path();
    let config = Config::load(&config_path)?;
    if let Some(level) = cli.log_level.as_deref()
        && !LOG_LEVELS.contains(&level)
    {
        return Err(vsync_core::Error::config(
            "--log-level",
            format!("{level} (must be one of {})", LOG_LEVELS.join(", ")),
        )
        .into());
    }
    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    logging::init(level)?;
    tracing::debug!(path = %config_path.display(), "Loaded configuration");

    let resolved = config.validate()?;
    let manager = Manager::from_config(&resolved)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Run { once: true } => runtime.block_on(manager.run_once())?,
        Commands::Run { once: false } => {
            runtime.block_on(manager.run_on_interval(resolved.interval))?
        }
    }
    Ok(())
}
