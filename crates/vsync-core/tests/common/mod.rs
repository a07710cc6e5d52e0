//! In-memory fakes of the external adapters

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use vsync_core::commands::CommandConfig;
use vsync_core::releases::ReleaseMatcher;
use vsync_core::{
    AllowedSemverChanges, Client, ClusterNode, Cluster, ComplianceSource, Error, Identities,
    PeerDirectory, Release, ReleaseSource, RepoId, Requirements, Result, SyncCommand,
    SyncEngine, SyncSettings, SyncSources, ValidatorRpc,
};

pub const ACTIVE: &str = "ActiveKey1111111111111111111111111111111111";
pub const PASSIVE: &str = "PassiveKey111111111111111111111111111111111";

pub struct FakeValidator {
    pub version: String,
    pub identity: String,
    pub fail: bool,
}

impl FakeValidator {
    pub fn new(version: &str, identity: &str) -> Self {
        Self {
            version: version.to_string(),
            identity: identity.to_string(),
            fail: false,
        }
    }

    fn check(&self, method: &str) -> Result<()> {
        if self.fail {
            return Err(Error::RpcFailed {
                method: method.to_string(),
                url: "fake://validator".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ValidatorRpc for FakeValidator {
    async fn version(&self) -> Result<String> {
        self.check("getVersion")?;
        Ok(self.version.clone())
    }

    async fn identity(&self) -> Result<String> {
        self.check("getIdentity")?;
        Ok(self.identity.clone())
    }

    async fn health(&self) -> Result<String> {
        self.check("getHealth")?;
        Ok("ok".to_string())
    }
}

#[derive(Default)]
pub struct FakePeers {
    pub live: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakePeers {
    pub fn with_live(keys: &[&str]) -> Self {
        Self {
            live: keys.iter().map(|k| k.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PeerDirectory for FakePeers {
    async fn cluster_nodes(&self) -> Result<Vec<ClusterNode>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .live
            .iter()
            .enumerate()
            .map(|(i, key)| ClusterNode {
                pubkey: key.clone(),
                gossip: Some(format!("10.0.0.{}:8001", i + 1)),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeReleases {
    pub releases: Vec<Release>,
    pub calls: AtomicUsize,
}

impl FakeReleases {
    pub fn new(releases: Vec<Release>) -> Self {
        Self {
            releases,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReleaseSource for FakeReleases {
    async fn recent_releases(&self, _repo: &RepoId, limit: usize) -> Result<Vec<Release>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.releases.iter().take(limit).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeCompliance {
    pub records: Vec<Requirements>,
    pub calls: AtomicUsize,
}

impl FakeCompliance {
    pub fn new(records: Vec<Requirements>) -> Self {
        Self {
            records,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ComplianceSource for FakeCompliance {
    async fn required_versions(&self, _cluster: Cluster) -> Result<Vec<Requirements>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

/// Agave release whose notes match the given cluster
pub fn agave_release(tag: &str, cluster: Cluster) -> Release {
    let body = match cluster {
        Cluster::MainnetBeta => "This is a stable release suitable for use on Mainnet Beta.",
        Cluster::Testnet => "This is a Testnet release.",
    };
    Release {
        tag_name: tag.to_string(),
        name: Some(tag.to_string()),
        body: Some(body.to_string()),
        ..Default::default()
    }
}

pub fn agave_bounds(epoch: u64, min: Option<&str>, max: Option<&str>) -> Requirements {
    Requirements {
        epoch,
        cluster: "mainnet-beta".to_string(),
        agave_min_version: min.map(str::to_string),
        agave_max_version: max.map(str::to_string),
        ..Default::default()
    }
}

/// Step appending `name` to `log` when it runs
pub fn marker_step(name: &str, log: &Path) -> CommandConfig {
    CommandConfig {
        name: name.to_string(),
        cmd: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            format!("echo \"{name} $1\" >> {}", log.display()),
            "sh".to_string(),
            "{{ .VersionFrom }}->{{ .VersionTo }}".to_string(),
        ],
        ..Default::default()
    }
}

pub fn read_log(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn settings(cluster: Cluster, commands: &[CommandConfig]) -> SyncSettings {
    let client = Client::Agave;
    SyncSettings {
        client,
        cluster,
        rpc_url: "http://127.0.0.1:8899".to_string(),
        identities: Identities {
            active: ACTIVE.to_string(),
            passive: PASSIVE.to_string(),
        },
        enabled_when_active: false,
        enabled_when_no_active_leader: false,
        enable_sfdp_compliance: false,
        allowed_version_range: None,
        allowed_semver_changes: AllowedSemverChanges::default(),
        repository: RepoId::from_url(client.default_repository_url()).unwrap(),
        matcher: ReleaseMatcher::resolve(client, None).unwrap(),
        commands: commands
            .iter()
            .enumerate()
            .map(|(i, c)| SyncCommand::parse(i, c).unwrap())
            .collect(),
    }
}

/// Engine over fakes, keeping handles for call-count assertions
pub struct Harness {
    pub validator: Arc<FakeValidator>,
    pub peers: Arc<FakePeers>,
    pub releases: Arc<FakeReleases>,
    pub compliance: Arc<FakeCompliance>,
}

impl Harness {
    pub fn new(validator: FakeValidator, releases: Vec<Release>) -> Self {
        Self {
            validator: Arc::new(validator),
            peers: Arc::new(FakePeers::with_live(&[ACTIVE])),
            releases: Arc::new(FakeReleases::new(releases)),
            compliance: Arc::new(FakeCompliance::default()),
        }
    }

    pub fn with_peers(mut self, live: &[&str]) -> Self {
        self.peers = Arc::new(FakePeers::with_live(live));
        self
    }

    pub fn with_compliance(mut self, records: Vec<Requirements>) -> Self {
        self.compliance = Arc::new(FakeCompliance::new(records));
        self
    }

    pub fn engine(&self, settings: SyncSettings) -> SyncEngine {
        SyncEngine::new(
            settings,
            SyncSources {
                validator: self.validator.clone(),
                peers: self.peers.clone(),
                releases: self.releases.clone(),
                compliance: self.compliance.clone(),
            },
        )
    }

    pub fn discovery_calls(&self) -> usize {
        self.releases.calls.load(Ordering::SeqCst) + self.compliance.calls.load(Ordering::SeqCst)
    }
}
