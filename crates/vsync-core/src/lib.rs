//! Version sync engine for redundant validator pairs
//!
//! Keeps an active/passive validator pair on a client version that satisfies
//! both the upstream release feed and the published compliance bounds:
//!
//! - **Role resolution**: which configured identity the local validator runs
//!   under, and whether a leader is live under the active identity
//! - **Target discovery**: latest matching upstream release, clamped into the
//!   compliance bounds when enabled
//! - **Decision**: whether a change is required and permitted
//! - **Execution**: an ordered, templated command pipeline with per-step
//!   failure policy
//!
//! # Architecture
//!
//! ```text
//!                      Manager
//!                         |
//!                    SyncEngine
//!                         |
//!     +----------+--------+---------+-------------+
//!     |          |                  |             |
//!   role   releases/compliance   version      commands
//!     |          |
//!    rpc       http
//! ```
//!
//! External services sit behind the [`ValidatorRpc`], [`PeerDirectory`],
//! [`ReleaseSource`] and [`ComplianceSource`] traits.

pub mod client;
pub mod commands;
pub mod compliance;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod releases;
pub mod role;
pub mod rpc;
pub mod version;

mod http;

pub use client::{Client, Cluster};
pub use commands::{
    CommandConfig, CommandContext, PipelineReport, StepOutcome, StepStatus, SyncCommand,
    run_pipeline,
};
pub use compliance::{ClientRequirements, ComplianceClient, ComplianceSource, Requirements};
pub use config::{Config, Identities, ResolvedConfig};
pub use engine::{AllowedSemverChanges, SyncEngine, SyncOutcome, SyncSettings, SyncSources};
pub use error::{Error, Result};
pub use http::DEFAULT_TIMEOUT;
pub use manager::{Manager, next_boundary};
pub use releases::{GithubClient, Release, ReleaseSource, RepoId};
pub use role::{Role, ValidatorState, find_identity_in_live_directory, resolve_role};
pub use rpc::{ClusterNode, JsonRpcClient, PeerDirectory, ValidatorRpc};
pub use version::{Direction, Version, VersionConstraint, VersionDiff};
