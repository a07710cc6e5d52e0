//! Error types for vsync-core

use std::path::PathBuf;

/// Result type for vsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a sync attempt
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Configuration errors: raised before any attempt runs
    /// Client name outside the supported set
    #[error("Unknown client: {name} (must be one of {valid})")]
    UnknownClient { name: String, valid: String },

    /// Cluster name outside the supported set
    #[error("Unknown cluster: {name} (must be one of {valid})")]
    UnknownCluster { name: String, valid: String },

    /// A command template could not be parsed
    #[error("Invalid template in sync.commands[{command}].{field}: {reason}")]
    InvalidTemplate {
        command: String,
        field: String,
        reason: String,
    },

    /// A version range expression could not be parsed
    #[error("Invalid version constraint '{constraint}': {reason}")]
    VersionConstraintParse { constraint: String, reason: String },

    /// A version string could not be parsed
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Release repository URL is neither HTTPS nor SCP-style
    #[error("Unsupported repository URL: {url}")]
    UnsupportedRepoUrl { url: String },

    /// Configuration file is missing
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Any other invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    Config { field: String, reason: String },

    // Transient I/O errors: fail the current attempt only
    /// Local validator or cluster JSON-RPC call failed
    #[error("RPC call {method} to {url} failed: {reason}")]
    RpcFailed {
        method: String,
        url: String,
        reason: String,
    },

    /// Upstream release catalog could not be read
    #[error("Release catalog unavailable for {repo}: {reason}")]
    ReleasesUnavailable { repo: String, reason: String },

    /// Compliance source could not be read
    #[error("Compliance requirements unavailable: {reason}")]
    ComplianceUnavailable { reason: String },

    /// Compliance source returned no epoch records
    #[error("No compliance requirements returned for cluster {cluster}")]
    ComplianceEmpty { cluster: String },

    // Domain-policy errors
    /// Compliance bound present but unparseable
    #[error("Invalid compliance {bound} version '{version}' for {client}")]
    InvalidBoundVersion {
        client: String,
        bound: String,
        version: String,
    },

    /// Compliance record has neither a min nor a max bound for the client
    #[error("Compliance requirements for {client} at epoch {epoch} carry no version bounds")]
    EmptyConstraint { client: String, epoch: u64 },

    /// No upstream release matched the client's pattern for the cluster
    #[error("No releases of {client} match the {cluster} pattern")]
    NoMatchingReleases { client: String, cluster: String },

    /// Local identity matches neither configured identity
    #[error("Validator identity {identity} is neither the active ({active}) nor the passive ({passive}) identity")]
    UnrecognizedIdentity {
        identity: String,
        active: String,
        passive: String,
    },

    /// Passive node found no live leader under the active identity
    #[error("No live leader with active identity {active} found in gossip (allow with sync.enabled_when_no_active_leader=true)")]
    NoActiveLeader { active: String },

    /// Target outside the configured acceptable range
    #[error("Target version {target} is outside the allowed range {constraint}")]
    TargetOutOfConstraint { target: String, constraint: String },

    /// Clamped compliance version has no upstream release
    #[error("Target version {version} has no published release in {repo}")]
    TargetNotReleased { version: String, repo: String },

    // Execution errors
    /// A pipeline step could not be launched
    #[error("Command {name} failed to start: {reason}")]
    CommandLaunch { name: String, reason: String },

    /// A pipeline step exited non-zero
    #[error("Command {name} exited with non-zero status (exit code: {exit_code:?}){detail}")]
    CommandFailed {
        name: String,
        exit_code: Option<i32>,
        detail: String,
    },

    // Transparent wrappers for underlying crate errors
    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Build a configuration error for a dotted field path
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
