//! Validator clients and clusters
//!
//! Both are closed sets. Every consumer matches them exhaustively, so adding
//! a client or cluster is a compile-checked change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Validator client software
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Client {
    Agave,
    JitoSolana,
    Bam,
    Firedancer,
}

/// Which compliance fields a client reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceFamily {
    Agave,
    Firedancer,
}

/// How upstream releases are matched to a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStrategy {
    /// Match the release notes body
    Body,
    /// Match the release title
    Title,
}

impl Client {
    pub const ALL: [Client; 4] = [
        Client::Agave,
        Client::JitoSolana,
        Client::Bam,
        Client::Firedancer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agave => "agave",
            Self::JitoSolana => "jito-solana",
            Self::Bam => "bam",
            Self::Firedancer => "firedancer",
        }
    }

    /// Agave derivatives are bound by the agave compliance limits
    pub fn compliance_family(&self) -> ComplianceFamily {
        match self {
            Self::Agave | Self::JitoSolana | Self::Bam => ComplianceFamily::Agave,
            Self::Firedancer => ComplianceFamily::Firedancer,
        }
    }

    pub fn release_strategy(&self) -> ReleaseStrategy {
        match self {
            Self::Agave => ReleaseStrategy::Body,
            Self::JitoSolana | Self::Bam | Self::Firedancer => ReleaseStrategy::Title,
        }
    }

    /// Upstream repository the client is released from
    pub fn default_repository_url(&self) -> &'static str {
        match self {
            Self::Agave => "https://github.com/anza-xyz/agave",
            Self::JitoSolana => "https://github.com/jito-foundation/jito-solana",
            Self::Bam => "https://github.com/jito-labs/bam-client",
            Self::Firedancer => "https://github.com/firedancer-io/firedancer",
        }
    }

    /// Built-in release pattern for a cluster, applied per [`Client::release_strategy`]
    pub fn default_release_pattern(&self, cluster: Cluster) -> &'static str {
        match (self, cluster) {
            (Self::Agave, Cluster::MainnetBeta) => {
                ".*This is a stable release suitable for use on Mainnet Beta.*"
            }
            (Self::Agave, Cluster::Testnet) => ".*This is a Testnet release.*",
            (Self::JitoSolana, Cluster::MainnetBeta) => {
                r"^Mainnet - v([0-9]+\.[0-9]+\.[0-9]+)-jito(?:\.([0-9]+))?$"
            }
            (Self::JitoSolana, Cluster::Testnet) => {
                r"^Testnet - v([0-9]+\.[0-9]+\.[0-9]+)-jito(?:\.([0-9]+))?$"
            }
            (Self::Bam, Cluster::MainnetBeta) => r"^Mainnet - v([0-9]+\.[0-9]+\.[0-9]+)-bam$",
            (Self::Bam, Cluster::Testnet) => r"^Testnet - v([0-9]+\.[0-9]+\.[0-9]+)-bam$",
            // Frankendancer will become Firedancer, so only the suffix is matched
            (Self::Firedancer, Cluster::MainnetBeta) => {
                r"^(.*)dancer Mainnet v([0-9]+\.[0-9]+\.[0-9]+)$"
            }
            (Self::Firedancer, Cluster::Testnet) => {
                r"^(.*)dancer Testnet v([0-9]+\.[0-9]+\.[0-9]+)$"
            }
        }
    }

    fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Client {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnknownClient {
                name: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

/// Solana cluster the validator pair runs on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    MainnetBeta,
    #[default]
    Testnet,
}

impl Cluster {
    pub const ALL: [Cluster; 2] = [Cluster::MainnetBeta, Cluster::Testnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Testnet => "testnet",
        }
    }

    /// Public RPC endpoint used for gossip lookups
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cluster {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnknownCluster {
                name: s.to_string(),
                valid: Self::ALL
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
