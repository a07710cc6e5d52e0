//! Drives sync attempts once or on wall-clock aligned intervals

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use crate::compliance::{ComplianceClient, DEFAULT_COMPLIANCE_URL};
use crate::config::ResolvedConfig;
use crate::engine::{SyncEngine, SyncOutcome, SyncSources};
use crate::error::Result;
use crate::http::DEFAULT_TIMEOUT;
use crate::releases::{DEFAULT_GITHUB_API_URL, GithubClient};
use crate::rpc::JsonRpcClient;

const BOUNDARY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// First interval boundary strictly after `now`.
///
/// Boundaries are multiples of `interval` counted from UTC midnight of the
/// current day, so a 10 minute interval fires at :00, :10, :20 and so on.
pub fn next_boundary(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let interval_nanos = i64::try_from(interval.as_nanos()).unwrap_or(i64::MAX);
    if interval_nanos == 0 {
        return now;
    }
    let start_of_day = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let since_midnight = (now - start_of_day).num_nanoseconds().unwrap_or(0);
    let next = (since_midnight / interval_nanos + 1).saturating_mul(interval_nanos);
    start_of_day + TimeDelta::nanoseconds(next)
}

pub struct Manager {
    engine: SyncEngine,
}

impl Manager {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    /// Wire the HTTP adapters described by `config`
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let settings = config.sync.clone();
        let validator = Arc::new(JsonRpcClient::new(&settings.rpc_url, DEFAULT_TIMEOUT)?);
        let peers = Arc::new(JsonRpcClient::new(&config.cluster_rpc_url, DEFAULT_TIMEOUT)?);
        let releases = Arc::new(GithubClient::new(DEFAULT_GITHUB_API_URL, DEFAULT_TIMEOUT)?);
        let compliance = Arc::new(ComplianceClient::new(DEFAULT_COMPLIANCE_URL, DEFAULT_TIMEOUT)?);

        tracing::debug!(
            client = %settings.client,
            cluster = %settings.cluster,
            validator_rpc = %settings.rpc_url,
            cluster_rpc = %config.cluster_rpc_url,
            repository = %settings.repository,
            commands = settings.commands.len(),
            "Created manager from config"
        );

        let sources = SyncSources {
            validator,
            peers,
            releases,
            compliance,
        };
        Ok(Self::new(SyncEngine::new(settings, sources)))
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Run a single attempt
    pub async fn run_once(&self) -> Result<()> {
        tracing::info!("Starting validator version sync (single run mode)");
        let outcome = self.engine.sync_once().await?;
        log_outcome(&outcome);
        Ok(())
    }

    /// Run attempts forever, aligned to `interval` boundaries.
    ///
    /// A failed attempt is logged and the loop continues.
    pub async fn run_on_interval(&self, interval: Duration) -> Result<()> {
        tracing::info!(
            interval = %humantime::format_duration(interval),
            "Starting validator version sync (continuous mode)"
        );

        let now = Utc::now();
        let first = next_boundary(now, interval);
        let wait = until(now, first);
        tracing::info!(
            wait = %humantime::format_duration(wait),
            next_sync = %first.format(BOUNDARY_FORMAT),
            "Waiting until next interval boundary"
        );
        tokio::time::sleep(wait).await;

        loop {
            tracing::info!("Running sync");
            let result = self.engine.sync_once().await;

            let now = Utc::now();
            let next = next_boundary(now, interval);
            let wait = until(now, next);
            let summary = format!(
                "next sync in {} at {}",
                humantime::format_duration(round_to_secs(wait)),
                next.format(BOUNDARY_FORMAT)
            );

            match result {
                Ok(outcome) => {
                    log_outcome(&outcome);
                    tracing::info!("sync succeeded - {summary}");
                }
                Err(e) => tracing::error!(error = %e, "sync failed - {summary}"),
            }

            tokio::time::sleep(wait).await;
        }
    }
}

fn until(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (then - now).to_std().unwrap_or_default()
}

fn round_to_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

fn log_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::SkippedActive => tracing::info!("Sync skipped - validator is active"),
        SyncOutcome::UpToDate { version } => {
            tracing::info!(version = %version, "Sync not needed - already on target version")
        }
        SyncOutcome::ChangeNotAllowed { from, to } => {
            tracing::info!(version = %from, target_version = %to, "Sync not permitted by allowed semver changes")
        }
        SyncOutcome::Synced {
            from,
            to,
            direction,
            report,
        } => tracing::info!(
            version = %from,
            target_version = %to,
            %direction,
            steps = report.steps.len(),
            "Sync completed"
        ),
    }
}
