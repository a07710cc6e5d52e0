//! Per-attempt sync decision
//!
//! One call to [`SyncEngine::sync_once`] refreshes the validator state, gates
//! on its role, resolves a target version from the release catalog and the
//! compliance bounds, and runs the command pipeline when a permitted change
//! is required. Nothing is carried from one attempt to the next.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span, field};

use crate::client::{Client, Cluster};
use crate::commands::{CommandContext, PipelineReport, SyncCommand, run_pipeline};
use crate::compliance::{ComplianceResolver, ComplianceSource};
use crate::config::Identities;
use crate::error::{Error, Result};
use crate::releases::{ReleaseDiscoverer, ReleaseMatcher, ReleaseSource, RepoId};
use crate::role::{Role, ValidatorState, find_identity_in_live_directory};
use crate::rpc::{PeerDirectory, ValidatorRpc};
use crate::version::{Direction, Version, VersionConstraint, VersionDiff};

/// Which semver segments a sync may change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedSemverChanges {
    #[serde(default)]
    pub major: bool,
    #[serde(default)]
    pub minor: bool,
    #[serde(default)]
    pub patch: bool,
}

impl Default for AllowedSemverChanges {
    fn default() -> Self {
        Self {
            major: false,
            minor: true,
            patch: true,
        }
    }
}

impl AllowedSemverChanges {
    pub fn any(&self) -> bool {
        self.major || self.minor || self.patch
    }

    /// The first segment `diff` changes that is not allowed
    pub fn disallowed_change(&self, diff: &VersionDiff) -> Option<&'static str> {
        if diff.has_major_change() && !self.major {
            Some("major")
        } else if diff.has_minor_change() && !self.minor {
            Some("minor")
        } else if diff.has_patch_change() && !self.patch {
            Some("patch")
        } else {
            None
        }
    }
}

/// External capabilities the engine reads from
#[derive(Clone)]
pub struct SyncSources {
    pub validator: Arc<dyn ValidatorRpc>,
    pub peers: Arc<dyn PeerDirectory>,
    pub releases: Arc<dyn ReleaseSource>,
    pub compliance: Arc<dyn ComplianceSource>,
}

/// Validated settings for one validator pair
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub client: Client,
    pub cluster: Cluster,
    pub rpc_url: String,
    pub identities: Identities,
    pub enabled_when_active: bool,
    pub enabled_when_no_active_leader: bool,
    pub enable_sfdp_compliance: bool,
    pub allowed_version_range: Option<VersionConstraint>,
    pub allowed_semver_changes: AllowedSemverChanges,
    pub repository: RepoId,
    pub matcher: ReleaseMatcher,
    pub commands: Vec<SyncCommand>,
}

/// How an attempt that did not fail ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Validator is active and syncing while active is disabled
    SkippedActive,
    /// Already running the target version
    UpToDate { version: Version },
    /// A change is required but `allowed_semver_changes` forbids it
    ChangeNotAllowed { from: Version, to: Version },
    Synced {
        from: Version,
        to: Version,
        direction: Direction,
        report: PipelineReport,
    },
}

pub struct SyncEngine {
    settings: SyncSettings,
    validator: Arc<dyn ValidatorRpc>,
    peers: Arc<dyn PeerDirectory>,
    releases: ReleaseDiscoverer,
    compliance: ComplianceResolver,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings, sources: SyncSources) -> Self {
        let releases = ReleaseDiscoverer::new(
            sources.releases,
            settings.client,
            settings.cluster,
            settings.repository.clone(),
            settings.matcher.clone(),
        );
        let compliance =
            ComplianceResolver::new(sources.compliance, settings.client, settings.cluster);

        Self {
            settings,
            validator: sources.validator,
            peers: sources.peers,
            releases,
            compliance,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one attempt to completion
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let span = tracing::info_span!(
            "sync",
            client = %self.settings.client,
            cluster = %self.settings.cluster,
            role = field::Empty,
            version = field::Empty,
            target_version = field::Empty,
        );
        async {
            let result = self.attempt().await;
            if let Err(error) = &result {
                tracing::error!(%error, "Sync attempt failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self) -> Result<SyncOutcome> {
        let settings = &self.settings;
        let identities = &settings.identities;

        if identities.is_same() {
            tracing::warn!(
                active = %identities.active,
                passive = %identities.passive,
                "Configured active and passive identities are the same"
            );
        }

        let state = ValidatorState::refresh(self.validator.as_ref()).await?;
        let role = state.role(&identities.active, &identities.passive);
        let span = Span::current();
        span.record("role", field::display(role));
        span.record("version", field::display(&state.version));
        tracing::debug!(
            version = %state.version,
            identity = %state.identity_public_key,
            health = %state.health_status,
            %role,
            "Refreshed validator state"
        );

        match role {
            Role::Active if !settings.enabled_when_active => {
                tracing::warn!(
                    %role,
                    version = %state.version,
                    "Validator is active - skipping sync (allow with sync.enabled_when_active=true)"
                );
                return Ok(SyncOutcome::SkippedActive);
            }
            Role::Active => {
                tracing::warn!(
                    %role,
                    version = %state.version,
                    "Validator is active and sync.enabled_when_active=true - syncing"
                );
            }
            Role::Passive => self.check_active_leader().await?,
            Role::Unknown => {
                tracing::warn!(
                    identity = %state.identity_public_key,
                    active = %identities.active,
                    passive = %identities.passive,
                    "Validator identity matches neither configured identity"
                );
                return Err(Error::UnrecognizedIdentity {
                    identity: state.identity_public_key.clone(),
                    active: identities.active.clone(),
                    passive: identities.passive.clone(),
                });
            }
        }

        let target = self.resolve_target().await?;
        span.record("target_version", field::display(target.core_string()));
        let diff = VersionDiff::new(state.version.clone(), target);
        tracing::debug!(
            %role,
            version = %diff.from,
            target_version = %diff.to.core_string(),
            "Final target version"
        );

        if diff.is_same_version() {
            tracing::info!(
                %role,
                version = %diff.from,
                "Validator already running target version - nothing to do"
            );
            return Ok(SyncOutcome::UpToDate { version: diff.to });
        }

        if let Some(range) = &settings.allowed_version_range
            && !range.satisfies(&diff.to)
        {
            tracing::error!(
                %role,
                version = %diff.from,
                target_version = %diff.to.core_string(),
                allowed_range = %range,
                "Target version is outside the allowed version range"
            );
            return Err(Error::TargetOutOfConstraint {
                target: diff.to.core_string(),
                constraint: range.to_string(),
            });
        }

        let allowed = settings.allowed_semver_changes;
        let disallowed = if allowed.any() {
            allowed.disallowed_change(&diff)
        } else {
            Some("any")
        };
        if let Some(change) = disallowed {
            tracing::warn!(
                %role,
                version = %diff.from,
                target_version = %diff.to.core_string(),
                change,
                "Version change not allowed by sync.allowed_semver_changes - not syncing"
            );
            return Ok(SyncOutcome::ChangeNotAllowed {
                from: diff.from,
                to: diff.to,
            });
        }

        let direction = diff.direction();
        tracing::info!(
            %role,
            %direction,
            "{direction} required v{} -> v{}",
            diff.from.core_string(),
            diff.to.core_string()
        );

        let context = CommandContext {
            command_index: 0,
            commands_count: settings.commands.len(),
            client: settings.client,
            rpc_url: settings.rpc_url.clone(),
            role,
            identity_public_key: state.identity_public_key.clone(),
            cluster: settings.cluster,
            hostname: state.hostname.clone(),
            version_from: diff.from.core_string(),
            version_to: diff.to.core_string(),
            sfdp_compliance_enabled: settings.enable_sfdp_compliance,
        };

        tracing::info!(count = settings.commands.len(), "Executing sync commands");
        let report = run_pipeline(&settings.commands, &context).await?;
        tracing::info!(%direction, "Sync commands executed successfully");

        Ok(SyncOutcome::Synced {
            from: diff.from,
            to: diff.to,
            direction,
            report,
        })
    }

    /// A passive node syncs only while a leader is live under the active
    /// identity, unless configured otherwise
    async fn check_active_leader(&self) -> Result<()> {
        let active = &self.settings.identities.active;
        if self.settings.enabled_when_no_active_leader {
            tracing::info!("Validator is passive - syncing without checking for an active leader");
            return Ok(());
        }

        match find_identity_in_live_directory(self.peers.as_ref(), active).await? {
            Some(node) => {
                tracing::info!(
                    active = %active,
                    gossip = node.gossip.as_deref().unwrap_or("-"),
                    "Validator is passive and active leader is live - syncing"
                );
                Ok(())
            }
            None => {
                tracing::error!(active = %active, "Validator is passive and no active leader found in gossip");
                Err(Error::NoActiveLeader {
                    active: active.clone(),
                })
            }
        }
    }

    /// Latest release, clamped into the compliance bounds when enabled
    async fn resolve_target(&self) -> Result<Version> {
        let discovery = self.releases.discover().await?;
        let latest = discovery.latest.clone();
        tracing::debug!(version = %latest, "Latest release from repository");

        if !self.settings.enable_sfdp_compliance {
            return Ok(latest);
        }

        let requirements = self.compliance.resolve().await?;
        let constraint = &requirements.constraint;
        tracing::debug!(epoch = requirements.epoch, %constraint, "Latest compliance requirements");

        if requirements.check(&latest) {
            tracing::info!(
                target_version = %latest.core_string(),
                %constraint,
                "Target version is within compliance constraints"
            );
            return Ok(latest);
        }

        let clamped = match (&requirements.max_version, &requirements.min_version) {
            (Some(max), _) if latest > *max => {
                tracing::warn!(
                    target_version = %latest.core_string(),
                    max_version = %max,
                    %constraint,
                    "Target version exceeds compliance maximum - using maximum"
                );
                max.clone()
            }
            (_, Some(min)) if latest < *min => {
                tracing::warn!(
                    target_version = %latest.core_string(),
                    min_version = %min,
                    %constraint,
                    "Target version is below compliance minimum - using minimum"
                );
                min.clone()
            }
            _ => return Ok(latest),
        };

        if !discovery.is_published(&clamped) {
            tracing::error!(
                target_version = %clamped.core_string(),
                repo = %self.releases.repo(),
                "Compliance version has no published release"
            );
            return Err(Error::TargetNotReleased {
                version: clamped.core_string(),
                repo: self.releases.repo().to_string(),
            });
        }
        Ok(clamped)
    }
}
