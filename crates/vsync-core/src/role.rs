//! Active/passive role resolution and gossip liveness

use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::rpc::{ClusterNode, PeerDirectory, ValidatorRpc};
use crate::version::Version;

/// Role of the local validator within the redundant pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Active,
    Passive,
    Unknown,
}

impl Role {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_passive(&self) -> bool {
        matches!(self, Self::Passive)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Passive => write!(f, "passive"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify an identity against the configured pair.
///
/// Matching the active key always wins, which covers a pair configured with
/// the same key twice.
pub fn resolve_role(identity: &str, active_key: &str, passive_key: &str) -> Role {
    if identity == active_key {
        Role::Active
    } else if identity == passive_key {
        Role::Passive
    } else {
        Role::Unknown
    }
}

/// Look up `pubkey` in the live gossip directory.
///
/// `Ok(None)` is the normal "not live" outcome; only transport or decode
/// failures are errors.
pub async fn find_identity_in_live_directory(
    directory: &dyn PeerDirectory,
    pubkey: &str,
) -> Result<Option<ClusterNode>> {
    let nodes = directory.cluster_nodes().await?;
    tracing::debug!(peers = nodes.len(), "Fetched gossip directory");
    Ok(nodes.into_iter().find(|node| node.pubkey == pubkey))
}

/// Snapshot of the local validator
#[derive(Debug, Clone)]
pub struct ValidatorState {
    pub version_string: String,
    pub version: Version,
    pub identity_public_key: String,
    pub health_status: String,
    pub hostname: String,
}

impl ValidatorState {
    /// Query every field; any failure fails the whole refresh
    pub async fn refresh(rpc: &dyn ValidatorRpc) -> Result<Self> {
        let hostname = hostname::get()?.to_string_lossy().into_owned();
        let version_string = rpc.version().await?;
        let version = Version::parse(&version_string)?;
        let identity_public_key = rpc.identity().await?;
        let health_status = rpc.health().await?;

        Ok(Self {
            version_string,
            version,
            identity_public_key,
            health_status,
            hostname,
        })
    }

    pub fn role(&self, active_key: &str, passive_key: &str) -> Role {
        resolve_role(&self.identity_public_key, active_key, passive_key)
    }
}
