//! Compliance-mandated version bounds
//!
//! The compliance authority publishes per-epoch min/max versions for each
//! client family on each cluster. The record with the highest epoch is
//! authoritative; it is fetched fresh on every attempt and never cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::{Client, Cluster, ComplianceFamily};
use crate::error::{Error, Result};
use crate::http;
use crate::version::{Version, VersionConstraint};

/// Default compliance API base URL
pub const DEFAULT_COMPLIANCE_URL: &str = "https://api.solana.org/api";

/// One per-epoch compliance record as published
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Requirements {
    pub epoch: u64,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub agave_min_version: Option<String>,
    #[serde(default)]
    pub agave_max_version: Option<String>,
    #[serde(default)]
    pub firedancer_min_version: Option<String>,
    #[serde(default)]
    pub firedancer_max_version: Option<String>,
    #[serde(default)]
    pub inherited_from_previous_epoch: bool,
}

impl Requirements {
    /// Raw (min, max) bound strings for a compliance family, blanks dropped
    fn bounds(&self, family: ComplianceFamily) -> (Option<&str>, Option<&str>) {
        let (min, max) = match family {
            ComplianceFamily::Agave => (&self.agave_min_version, &self.agave_max_version),
            ComplianceFamily::Firedancer => {
                (&self.firedancer_min_version, &self.firedancer_max_version)
            }
        };
        fn present(s: &Option<String>) -> Option<&str> {
            s.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        (present(min), present(max))
    }

    /// Resolve the bounds that apply to `client`.
    ///
    /// Fails when a present bound does not parse, or when neither bound is
    /// present (an unconstrained record is not actionable).
    pub fn for_client(&self, client: Client) -> Result<ClientRequirements> {
        let (min, max) = self.bounds(client.compliance_family());

        let parse_bound = |bound: &str, raw: Option<&str>| -> Result<Option<Version>> {
            raw.map(|s| {
                Version::parse(s).map_err(|_| Error::InvalidBoundVersion {
                    client: client.to_string(),
                    bound: bound.to_string(),
                    version: s.to_string(),
                })
            })
            .transpose()
        };
        let min_version = parse_bound("min", min)?;
        let max_version = parse_bound("max", max)?;

        let constraint = VersionConstraint::between(min_version.as_ref(), max_version.as_ref())
            .ok_or_else(|| Error::EmptyConstraint {
                client: client.to_string(),
                epoch: self.epoch,
            })?;

        Ok(ClientRequirements {
            epoch: self.epoch,
            cluster: self.cluster.clone(),
            client,
            min_version,
            max_version,
            constraint,
        })
    }
}

/// Compliance bounds resolved for a single client
#[derive(Debug, Clone)]
pub struct ClientRequirements {
    pub epoch: u64,
    pub cluster: String,
    pub client: Client,
    pub min_version: Option<Version>,
    pub max_version: Option<Version>,
    pub constraint: VersionConstraint,
}

impl ClientRequirements {
    pub fn has_min_version(&self) -> bool {
        self.min_version.is_some()
    }

    pub fn has_max_version(&self) -> bool {
        self.max_version.is_some()
    }

    pub fn check(&self, version: &Version) -> bool {
        self.constraint.satisfies(version)
    }
}

/// Pick the record with the highest epoch; the first one wins on ties
pub fn select_latest(records: Vec<Requirements>, cluster: Cluster) -> Result<Requirements> {
    records
        .into_iter()
        .reduce(|best, r| if r.epoch > best.epoch { r } else { best })
        .ok_or_else(|| Error::ComplianceEmpty {
            cluster: cluster.to_string(),
        })
}

/// Source of published compliance records
#[async_trait]
pub trait ComplianceSource: Send + Sync {
    /// All per-epoch records currently published for `cluster`
    async fn required_versions(&self, cluster: Cluster) -> Result<Vec<Requirements>>;
}

#[derive(Debug, Deserialize)]
struct RequirementsResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Vec<Requirements>,
}

/// HTTP client for the compliance API
#[derive(Debug, Clone)]
pub struct ComplianceClient {
    base_url: String,
    client: reqwest::Client,
}

impl ComplianceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::client(timeout)?,
        })
    }
}

#[async_trait]
impl ComplianceSource for ComplianceClient {
    async fn required_versions(&self, cluster: Cluster) -> Result<Vec<Requirements>> {
        let url = format!("{}/epoch/required_versions", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("cluster", cluster.as_str())]);

        let response: RequirementsResponse = http::get_json(request)
            .await
            .map_err(|reason| Error::ComplianceUnavailable { reason })?;

        if let Some(error) = response.error.filter(|e| !e.is_empty()) {
            return Err(Error::ComplianceUnavailable {
                reason: format!("API error: {error}"),
            });
        }
        Ok(response.data)
    }
}

/// Resolves the authoritative compliance bounds for one client and cluster
pub struct ComplianceResolver {
    source: Arc<dyn ComplianceSource>,
    client: Client,
    cluster: Cluster,
}

impl ComplianceResolver {
    pub fn new(source: Arc<dyn ComplianceSource>, client: Client, cluster: Cluster) -> Self {
        Self {
            source,
            client,
            cluster,
        }
    }

    /// Fetch all records and return the highest-epoch one
    pub async fn latest_requirements(&self) -> Result<Requirements> {
        let records = self.source.required_versions(self.cluster).await?;
        let latest = select_latest(records, self.cluster)?;
        tracing::debug!(
            epoch = latest.epoch,
            cluster = %self.cluster,
            inherited = latest.inherited_from_previous_epoch,
            "Latest compliance requirements"
        );
        Ok(latest)
    }

    /// Fetch the latest record and resolve it for the configured client
    pub async fn resolve(&self) -> Result<ClientRequirements> {
        self.latest_requirements().await?.for_client(self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: u64, min: &str, max: &str) -> Requirements {
        Requirements {
            epoch,
            cluster: "mainnet-beta".to_string(),
            agave_min_version: Some(min.to_string()),
            agave_max_version: Some(max.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_latest_picks_highest_epoch() {
        let records = vec![
            record(700, "1.17.0", ""),
            record(702, "1.18.0", ""),
            record(701, "1.17.5", ""),
        ];
        let latest = select_latest(records, Cluster::MainnetBeta).unwrap();
        assert_eq!(latest.epoch, 702);
    }

    #[test]
    fn test_select_latest_empty() {
        let err = select_latest(vec![], Cluster::Testnet).unwrap_err();
        assert!(matches!(err, Error::ComplianceEmpty { .. }));
    }

    #[test]
    fn test_for_client_min_and_max() {
        let req = record(1, "1.18.0", "1.19.0").for_client(Client::Agave).unwrap();
        assert!(req.has_min_version());
        assert!(req.has_max_version());
        assert_eq!(req.constraint.as_str(), ">= 1.18.0, <= 1.19.0");
        assert!(req.check(&Version::parse("1.18.4").unwrap()));
        assert!(!req.check(&Version::parse("1.19.1").unwrap()));
    }

    #[test]
    fn test_for_client_family_mapping() {
        let req = record(1, "2.0.0", "").for_client(Client::JitoSolana).unwrap();
        assert_eq!(req.min_version, Some(Version::new(2, 0, 0)));
        assert!(!req.has_max_version());

        let req = record(1, "2.0.0", "").for_client(Client::Bam).unwrap();
        assert!(req.has_min_version());
    }

    #[test]
    fn test_for_client_firedancer_uses_own_fields() {
        let mut r = record(1, "2.0.0", "");
        r.firedancer_max_version = Some("0.503.20214".to_string());
        let req = r.for_client(Client::Firedancer).unwrap();
        assert!(!req.has_min_version());
        assert_eq!(req.max_version, Some(Version::new(0, 503, 20214)));
    }

    #[test]
    fn test_for_client_trims_padded_bounds() {
        let req = record(3, " 1.18.2 ", "\t1.19.0").for_client(Client::Agave).unwrap();
        assert_eq!(req.min_version, Some(Version::new(1, 18, 2)));
        assert_eq!(req.max_version, Some(Version::new(1, 19, 0)));
    }

    #[test]
    fn test_for_client_empty_constraint() {
        let err = record(9, "", " ").for_client(Client::Agave).unwrap_err();
        assert!(matches!(err, Error::EmptyConstraint { epoch: 9, .. }));
    }

    #[test]
    fn test_for_client_invalid_bound() {
        let err = record(1, "one.two", "").for_client(Client::Agave).unwrap_err();
        match err {
            Error::InvalidBoundVersion { bound, version, .. } => {
                assert_eq!(bound, "min");
                assert_eq!(version, "one.two");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_requirements_deserialize_nulls() {
        let json = r#"{"epoch": 812, "cluster": "testnet",
            "agave_min_version": "2.2.0", "agave_max_version": null,
            "inherited_from_previous_epoch": true}"#;
        let r: Requirements = serde_json::from_str(json).unwrap();
        assert_eq!(r.epoch, 812);
        assert!(r.inherited_from_previous_epoch);
        let req = r.for_client(Client::Agave).unwrap();
        assert!(!req.has_max_version());
    }
}
