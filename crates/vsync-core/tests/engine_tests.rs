//! Sync attempt scenarios against in-memory adapters

mod common;

use std::sync::atomic::Ordering;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tracing_test::traced_test;

use common::*;
use vsync_core::{Cluster, Direction, Error, StepStatus, SyncOutcome, Version, VersionConstraint};

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

#[tokio::test]
async fn test_upgrade_within_compliance_bounds() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");

    let harness = Harness::new(
        FakeValidator::new("1.17.0", PASSIVE),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    )
    .with_compliance(vec![
        agave_bounds(600, Some("1.17.0"), None),
        agave_bounds(601, Some("1.18.0"), Some("1.19.0")),
    ]);
    let mut settings = settings(Cluster::MainnetBeta, &[marker_step("install", &log)]);
    settings.enable_sfdp_compliance = true;

    let outcome = harness.engine(settings).sync_once().await.unwrap();
    match outcome {
        SyncOutcome::Synced {
            from,
            to,
            direction,
            report,
        } => {
            assert_eq!(from, v("1.17.0"));
            assert_eq!(to, v("1.18.0"));
            assert_eq!(direction, Direction::Upgrade);
            assert_eq!(report.names_with(StepStatus::Succeeded), vec!["install"]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(read_log(&log), vec!["install 1.17.0->1.18.0"]);
}

#[tokio::test]
async fn test_latest_above_compliance_max_clamps_down() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");

    let harness = Harness::new(
        FakeValidator::new("1.20.0", PASSIVE),
        vec![
            agave_release("v1.21.0", Cluster::MainnetBeta),
            agave_release("v1.20.0", Cluster::MainnetBeta),
            agave_release("v1.19.0", Cluster::MainnetBeta),
        ],
    )
    .with_compliance(vec![agave_bounds(700, None, Some("1.19.0"))]);
    let mut settings = settings(Cluster::MainnetBeta, &[marker_step("install", &log)]);
    settings.enable_sfdp_compliance = true;

    let outcome = harness.engine(settings).sync_once().await.unwrap();
    assert!(matches!(
        outcome,
        SyncOutcome::Synced { ref to, direction: Direction::Downgrade, .. } if *to == v("1.19.0")
    ));
    assert_eq!(read_log(&log), vec!["install 1.20.0->1.19.0"]);
}

#[tokio::test]
async fn test_latest_below_compliance_min_clamps_up() {
    let harness = Harness::new(
        FakeValidator::new("2.0.1", PASSIVE),
        vec![
            agave_release("v2.0.3", Cluster::MainnetBeta),
            agave_release("v2.0.5", Cluster::Testnet),
        ],
    )
    .with_compliance(vec![agave_bounds(700, Some("2.0.5"), None)]);
    let mut settings = settings(Cluster::MainnetBeta, &[]);
    settings.enable_sfdp_compliance = true;

    let outcome = harness.engine(settings).sync_once().await.unwrap();
    assert!(matches!(
        outcome,
        SyncOutcome::Synced { ref to, direction: Direction::Upgrade, .. } if *to == v("2.0.5")
    ));
}

#[tokio::test]
async fn test_clamped_version_must_be_released() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");

    let harness = Harness::new(
        FakeValidator::new("1.20.0", PASSIVE),
        vec![agave_release("v1.21.0", Cluster::MainnetBeta)],
    )
    .with_compliance(vec![agave_bounds(700, None, Some("1.19.0"))]);
    let mut settings = settings(Cluster::MainnetBeta, &[marker_step("install", &log)]);
    settings.enable_sfdp_compliance = true;

    let err = harness.engine(settings).sync_once().await.unwrap_err();
    assert!(matches!(err, Error::TargetNotReleased { ref version, .. } if version == "1.19.0"));
    assert!(read_log(&log).is_empty());
}

#[tokio::test]
async fn test_unrecognized_identity_fails_before_discovery() {
    let harness = Harness::new(
        FakeValidator::new("1.17.0", "SomeoneElse"),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    );
    let mut settings = settings(Cluster::MainnetBeta, &[]);
    settings.enable_sfdp_compliance = true;

    let err = harness.engine(settings).sync_once().await.unwrap_err();
    assert!(matches!(err, Error::UnrecognizedIdentity { ref identity, .. } if identity == "SomeoneElse"));
    assert_eq!(harness.discovery_calls(), 0);
    assert_eq!(harness.peers.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_active_skips_by_default() {
    let harness = Harness::new(
        FakeValidator::new("1.17.0", ACTIVE),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    );

    let outcome = harness
        .engine(settings(Cluster::MainnetBeta, &[]))
        .sync_once()
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::SkippedActive);
    assert_eq!(harness.discovery_calls(), 0);
}

#[tokio::test]
async fn test_active_syncs_when_enabled() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");
    let harness = Harness::new(
        FakeValidator::new("1.17.0", ACTIVE),
        vec![agave_release("v1.17.2", Cluster::MainnetBeta)],
    );
    let mut settings = settings(Cluster::MainnetBeta, &[marker_step("install", &log)]);
    settings.enabled_when_active = true;

    let outcome = harness.engine(settings).sync_once().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced { .. }));
    assert_eq!(read_log(&log), vec!["install 1.17.0->1.17.2"]);
    assert_eq!(harness.peers.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_passive_without_live_leader_fails() {
    let harness = Harness::new(
        FakeValidator::new("1.17.0", PASSIVE),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    )
    .with_peers(&["SomebodyElse", PASSIVE]);

    let err = harness
        .engine(settings(Cluster::MainnetBeta, &[]))
        .sync_once()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoActiveLeader { ref active } if active == ACTIVE));
    assert_eq!(harness.discovery_calls(), 0);
}

#[tokio::test]
async fn test_passive_without_leader_allowed() {
    let harness = Harness::new(
        FakeValidator::new("1.17.0", PASSIVE),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    )
    .with_peers(&[]);
    let mut settings = settings(Cluster::MainnetBeta, &[]);
    settings.enabled_when_no_active_leader = true;

    let outcome = harness.engine(settings).sync_once().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced { .. }));
}

#[tokio::test]
async fn test_same_version_is_noop() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");
    let harness = Harness::new(
        FakeValidator::new("1.18.0", PASSIVE),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    );

    let outcome = harness
        .engine(settings(Cluster::MainnetBeta, &[marker_step("install", &log)]))
        .sync_once()
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::UpToDate { version: v("1.18.0") });
    assert!(read_log(&log).is_empty());
}

#[tokio::test]
async fn test_prerelease_suffix_ignored_for_equality() {
    let harness = Harness::new(
        FakeValidator::new("1.18.0-beta.1", PASSIVE),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    );

    let outcome = harness
        .engine(settings(Cluster::MainnetBeta, &[]))
        .sync_once()
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::UpToDate { .. }));
}

#[tokio::test]
async fn test_target_outside_allowed_range_fails() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");
    let harness = Harness::new(
        FakeValidator::new("2.0.1", PASSIVE),
        vec![agave_release("v2.1.0", Cluster::MainnetBeta)],
    );
    let mut settings = settings(Cluster::MainnetBeta, &[marker_step("install", &log)]);
    settings.allowed_version_range = Some(VersionConstraint::parse(">=2.0.0, <2.1.0").unwrap());

    let err = harness.engine(settings).sync_once().await.unwrap_err();
    assert!(matches!(err, Error::TargetOutOfConstraint { ref target, .. } if target == "2.1.0"));
    assert!(read_log(&log).is_empty());
}

#[tokio::test]
async fn test_major_change_not_allowed_by_default() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");
    let harness = Harness::new(
        FakeValidator::new("1.18.22", PASSIVE),
        vec![agave_release("v2.0.0", Cluster::MainnetBeta)],
    );

    let outcome = harness
        .engine(settings(Cluster::MainnetBeta, &[marker_step("install", &log)]))
        .sync_once()
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::ChangeNotAllowed {
            from: v("1.18.22"),
            to: v("2.0.0"),
        }
    );
    assert!(read_log(&log).is_empty());
}

#[tokio::test]
async fn test_no_changes_allowed() {
    let harness = Harness::new(
        FakeValidator::new("1.18.0", PASSIVE),
        vec![agave_release("v1.18.1", Cluster::MainnetBeta)],
    );
    let mut settings = settings(Cluster::MainnetBeta, &[]);
    settings.allowed_semver_changes.minor = false;
    settings.allowed_semver_changes.patch = false;

    let outcome = harness.engine(settings).sync_once().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::ChangeNotAllowed { .. }));
}

#[tokio::test]
async fn test_testnet_never_trails_mainnet() {
    let harness = Harness::new(
        FakeValidator::new("2.1.0", PASSIVE),
        vec![
            agave_release("v2.1.0", Cluster::Testnet),
            agave_release("v2.1.4", Cluster::MainnetBeta),
        ],
    );

    let outcome = harness
        .engine(settings(Cluster::Testnet, &[]))
        .sync_once()
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced { ref to, .. } if *to == v("2.1.4")));
}

#[tokio::test]
async fn test_no_matching_release_fails() {
    let harness = Harness::new(
        FakeValidator::new("2.1.0", PASSIVE),
        vec![agave_release("v2.2.0", Cluster::Testnet)],
    );

    let err = harness
        .engine(settings(Cluster::MainnetBeta, &[]))
        .sync_once()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoMatchingReleases { .. }));
}

#[tokio::test]
async fn test_refresh_failure_aborts_attempt() {
    let mut validator = FakeValidator::new("1.17.0", PASSIVE);
    validator.fail = true;
    let harness = Harness::new(validator, vec![agave_release("v1.18.0", Cluster::MainnetBeta)]);

    let err = harness
        .engine(settings(Cluster::MainnetBeta, &[]))
        .sync_once()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RpcFailed { .. }));
    assert_eq!(harness.discovery_calls(), 0);
}

#[tokio::test]
async fn test_failing_step_fails_attempt() {
    let temp = TempDir::new().unwrap();
    let log = temp.path().join("steps.log");
    let broken = vsync_core::CommandConfig {
        name: "stop-validator".to_string(),
        cmd: "sh".to_string(),
        args: vec!["-c".to_string(), "exit 4".to_string()],
        ..Default::default()
    };
    let harness = Harness::new(
        FakeValidator::new("1.17.0", PASSIVE),
        vec![agave_release("v1.17.3", Cluster::MainnetBeta)],
    );

    let err = harness
        .engine(settings(
            Cluster::MainnetBeta,
            &[broken, marker_step("install", &log)],
        ))
        .sync_once()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandFailed { exit_code: Some(4), .. }));
    assert!(read_log(&log).is_empty());
}

#[tokio::test]
async fn test_compliance_failure_aborts_attempt() {
    let harness = Harness::new(
        FakeValidator::new("1.17.0", PASSIVE),
        vec![agave_release("v1.18.0", Cluster::MainnetBeta)],
    )
    .with_compliance(vec![]);
    let mut settings = settings(Cluster::MainnetBeta, &[]);
    settings.enable_sfdp_compliance = true;

    let err = harness.engine(settings).sync_once().await.unwrap_err();
    assert!(matches!(err, Error::ComplianceEmpty { .. }));
}

#[tokio::test]
#[traced_test]
async fn test_failed_attempt_is_logged_with_context() {
    let broken = vsync_core::CommandConfig {
        name: "stop-validator".to_string(),
        cmd: "sh".to_string(),
        args: vec!["-c".to_string(), "exit 4".to_string()],
        ..Default::default()
    };
    let harness = Harness::new(
        FakeValidator::new("1.17.0", PASSIVE),
        vec![agave_release("v1.17.3", Cluster::MainnetBeta)],
    );

    let result = harness
        .engine(settings(Cluster::MainnetBeta, &[broken]))
        .sync_once()
        .await;
    assert!(result.is_err());

    logs_assert(|lines: &[&str]| {
        let failure = lines
            .iter()
            .find(|line| line.contains("Sync attempt failed"))
            .ok_or_else(|| "no failure event".to_string())?;
        for expected in [
            "client=agave",
            "cluster=mainnet-beta",
            "role=passive",
            "version=1.17.0",
            "target_version=1.17.3",
            "stop-validator",
        ] {
            if !failure.contains(expected) {
                return Err(format!("missing {expected} in {failure}"));
            }
        }
        Ok(())
    });
}

#[tokio::test]
#[traced_test]
async fn test_refresh_failure_is_logged_in_span() {
    let mut validator = FakeValidator::new("1.17.0", PASSIVE);
    validator.fail = true;
    let harness = Harness::new(validator, vec![agave_release("v1.18.0", Cluster::MainnetBeta)]);

    let result = harness
        .engine(settings(Cluster::MainnetBeta, &[]))
        .sync_once()
        .await;
    assert!(result.is_err());
    assert!(logs_contain("Sync attempt failed"));
    assert!(logs_contain("cluster=mainnet-beta"));
}
