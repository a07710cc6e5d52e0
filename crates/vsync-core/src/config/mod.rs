//! YAML configuration
//!
//! [`Config`] mirrors the file as written. [`Config::validate`] turns it into a
//! [`ResolvedConfig`] with every name, URL, range expression, regex and
//! command template checked, so a bad value fails before the first attempt.

mod identity;

pub use identity::{
    Identities, IdentitiesConfig, pubkey_from_keypair_bytes, pubkey_from_keypair_file,
};

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{Client, Cluster};
use crate::commands::{CommandConfig, SyncCommand};
use crate::engine::{AllowedSemverChanges, SyncSettings};
use crate::error::{Error, Result};
use crate::releases::{ReleaseMatcher, RepoId, RepositoryOverride};
use crate::version::VersionConstraint;

/// Log levels accepted by `log.level`
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub const DEFAULT_VALIDATOR_RPC_URL: &str = "http://127.0.0.1:8899";
pub const DEFAULT_INTERVAL: &str = "10m";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub client: String,
    #[serde(default = "default_validator_rpc_url")]
    pub rpc_url: String,
    #[serde(default)]
    pub identities: IdentitiesConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            client: String::new(),
            rpc_url: default_validator_rpc_url(),
            identities: IdentitiesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_name")]
    pub name: String,
    /// Cluster RPC endpoint used for the gossip lookup
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            rpc_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval")]
    pub interval_duration: String,
    #[serde(default)]
    pub enabled_when_active: bool,
    #[serde(default)]
    pub enabled_when_no_active_leader: bool,
    #[serde(default)]
    pub enable_sfdp_compliance: bool,
    #[serde(default)]
    pub allowed_version_range: Option<String>,
    #[serde(default)]
    pub allowed_semver_changes: AllowedSemverChanges,
    #[serde(default)]
    pub client_source_repositories: HashMap<String, RepositoryOverride>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_duration: default_interval(),
            enabled_when_active: false,
            enabled_when_no_active_leader: false,
            enable_sfdp_compliance: false,
            allowed_version_range: None,
            allowed_semver_changes: AllowedSemverChanges::default(),
            client_source_repositories: HashMap::new(),
            commands: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_validator_rpc_url() -> String {
    DEFAULT_VALIDATOR_RPC_URL.to_string()
}

fn default_cluster_name() -> String {
    Cluster::default().to_string()
}

fn default_interval() -> String {
    DEFAULT_INTERVAL.to_string()
}

/// Configuration with every value checked and typed
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub log_level: String,
    pub cluster_rpc_url: String,
    pub interval: Duration,
    pub sync: SyncSettings,
}

impl Config {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Check every value and build the typed configuration
    pub fn validate(&self) -> Result<ResolvedConfig> {
        let log_level = self.log.level.trim().to_lowercase();
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(Error::config(
                "log.level",
                format!("{} (must be one of {})", self.log.level, LOG_LEVELS.join(", ")),
            ));
        }

        if self.validator.client.trim().is_empty() {
            return Err(Error::config("validator.client", "is required"));
        }
        let client: Client = self.validator.client.trim().parse()?;
        let cluster: Cluster = self.cluster.name.trim().parse()?;

        let rpc_url = validate_http_url("validator.rpc_url", &self.validator.rpc_url)?;
        let cluster_rpc_url = match self.cluster.rpc_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => validate_http_url("cluster.rpc_url", url)?,
            _ => cluster.default_rpc_url().to_string(),
        };

        let identities = self.validator.identities.resolve()?;
        let interval = parse_interval(&self.sync.interval_duration)?;

        let allowed_version_range = match self.sync.allowed_version_range.as_deref().map(str::trim) {
            Some(range) if !range.is_empty() => Some(VersionConstraint::parse(range)?),
            _ => None,
        };

        let mut own_override = None;
        for (name, repository) in &self.sync.client_source_repositories {
            let configured: Client = name.parse()?;
            if configured == client {
                own_override = Some(repository);
            }
        }
        let repository_url = own_override
            .and_then(|o| o.url.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(client.default_repository_url());
        let repository = RepoId::from_url(repository_url)?;
        let matcher = ReleaseMatcher::resolve(client, own_override)?;

        let commands = self
            .sync
            .commands
            .iter()
            .enumerate()
            .map(|(i, c)| SyncCommand::parse(i, c))
            .collect::<Result<Vec<_>>>()?;
        if commands.is_empty() {
            tracing::warn!("No sync commands configured - a required sync will run nothing");
        }

        Ok(ResolvedConfig {
            log_level,
            cluster_rpc_url,
            interval,
            sync: SyncSettings {
                client,
                cluster,
                rpc_url,
                identities,
                enabled_when_active: self.sync.enabled_when_active,
                enabled_when_no_active_leader: self.sync.enabled_when_no_active_leader,
                enable_sfdp_compliance: self.sync.enable_sfdp_compliance,
                allowed_version_range,
                allowed_semver_changes: self.sync.allowed_semver_changes,
                repository,
                matcher,
                commands,
            },
        })
    }
}

fn validate_http_url(field: &str, raw: &str) -> Result<String> {
    let raw = raw.trim();
    let parsed = url::Url::parse(raw).map_err(|e| Error::config(field, format!("{raw}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(Error::config(
            field,
            format!("unsupported scheme {other} (must be http or https)"),
        )),
    }
}

fn parse_interval(raw: &str) -> Result<Duration> {
    let interval = humantime::parse_duration(raw.trim())
        .map_err(|e| Error::config("sync.interval_duration", format!("{raw}: {e}")))?;
    if interval.is_zero() {
        return Err(Error::config("sync.interval_duration", "must be greater than zero"));
    }
    Ok(interval)
}
