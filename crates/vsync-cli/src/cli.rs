//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_CONFIG_PATH: &str = "~/validator-version-sync/config.yaml";

/// Validator Version Sync - keep a validator pair on the right client version
#[derive(Parser, Debug)]
#[command(name = "validator-version-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "VALIDATOR_VERSION_SYNC_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config: String,

    /// Log level (trace, debug, info, warn, error); overrides log.level
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Check the validator version and sync it when required
    ///
    /// Runs on wall-clock aligned intervals (sync.interval_duration) until
    /// stopped, or a single time with --once.
    Run {
        /// Run a single sync attempt and exit
        #[arg(long)]
        once: bool,
    },
}

impl Cli {
    /// Configuration path with a leading `~` expanded
    pub fn config_path(&self) -> PathBuf {
        expand_home(&self.config)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
