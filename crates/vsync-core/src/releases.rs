//! Upstream release discovery
//!
//! Reads a bounded window of recent releases for a client's repository,
//! keeps the ones whose body (or title) matches the per-cluster pattern and
//! selects the highest version per cluster. Testnet never trails mainnet:
//! when the mainnet maximum is newer than the testnet one, the mainnet
//! version is used for testnet.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::{Client, Cluster, ReleaseStrategy};
use crate::error::{Error, Result};
use crate::http;
use crate::version::Version;

/// Default GitHub API base URL
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Number of most-recent releases inspected per attempt
pub const DEFAULT_RELEASE_WINDOW: usize = 100;

static HTTPS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/@\s]+/(?P<path>[^\s]+)$").unwrap());
static SCP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:ssh://)?[\w.-]+@[^:/\s]+[:/](?P<path>[^\s]+)$").unwrap());

/// Owner/repository pair derived from a repository URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    /// Parse `https://host/owner/repo[.git]` or `git@host:owner/repo[.git]`
    pub fn from_url(url: &str) -> Result<Self> {
        let unsupported = || Error::UnsupportedRepoUrl {
            url: url.to_string(),
        };
        let trimmed = url.trim();

        let path = HTTPS_URL
            .captures(trimmed)
            .or_else(|| SCP_URL.captures(trimmed))
            .and_then(|c| c.name("path"))
            .map(|m| m.as_str())
            .ok_or_else(unsupported)?;

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [owner, repo, ..] => Ok(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(unsupported()),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// One entry of the upstream release catalog
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Release {
    /// Tag with the leading `v` removed
    pub fn version_tag(&self) -> &str {
        self.tag_name.strip_prefix('v').unwrap_or(&self.tag_name)
    }
}

/// Source of recent upstream releases
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Most recent `limit` releases of `repo`, newest first
    async fn recent_releases(&self, repo: &RepoId, limit: usize) -> Result<Vec<Release>>;
}

/// GitHub REST client for the releases endpoint
#[derive(Debug, Clone)]
pub struct GithubClient {
    base_url: String,
    client: reqwest::Client,
}

impl GithubClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::client(timeout)?,
        })
    }
}

#[async_trait]
impl ReleaseSource for GithubClient {
    async fn recent_releases(&self, repo: &RepoId, limit: usize) -> Result<Vec<Release>> {
        let url = format!("{}/repos/{}/{}/releases", self.base_url, repo.owner, repo.repo);
        let request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .query(&[("per_page", limit.min(100).to_string())]);

        http::get_json(request)
            .await
            .map_err(|reason| Error::ReleasesUnavailable {
                repo: repo.to_string(),
                reason,
            })
    }
}

/// Operator override of a client's source repository and patterns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryOverride {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub release_notes_regexes: HashMap<Cluster, String>,
    #[serde(default)]
    pub release_title_regexes: HashMap<Cluster, String>,
}

/// Per-cluster release patterns for one client
#[derive(Debug, Clone)]
pub struct ReleaseMatcher {
    strategy: ReleaseStrategy,
    patterns: HashMap<Cluster, Regex>,
}

impl ReleaseMatcher {
    /// Built-in patterns for `client`, replaced by any configured override.
    ///
    /// Notes regexes switch the strategy to body matching and title regexes
    /// to title matching; setting both is rejected. Clusters without an
    /// override keep the built-in pattern only when the strategy is unchanged.
    pub fn resolve(client: Client, overrides: Option<&RepositoryOverride>) -> Result<Self> {
        let default_strategy = client.release_strategy();
        if let Some(o) = overrides
            && !o.release_notes_regexes.is_empty()
            && !o.release_title_regexes.is_empty()
        {
            return Err(Error::config(
                format!("sync.client_source_repositories.{client}"),
                "release_notes_regexes and release_title_regexes are mutually exclusive",
            ));
        }
        let (strategy, custom) = match overrides {
            Some(o) if !o.release_notes_regexes.is_empty() => {
                (ReleaseStrategy::Body, Some(&o.release_notes_regexes))
            }
            Some(o) if !o.release_title_regexes.is_empty() => {
                (ReleaseStrategy::Title, Some(&o.release_title_regexes))
            }
            _ => (default_strategy, None),
        };

        let mut patterns = HashMap::new();
        for cluster in Cluster::ALL {
            let pattern = match custom.and_then(|m| m.get(&cluster)) {
                Some(p) => p.as_str(),
                None if strategy == default_strategy => client.default_release_pattern(cluster),
                None => {
                    return Err(Error::config(
                        format!("sync.client_source_repositories.{client}"),
                        format!("missing release pattern for cluster {cluster}"),
                    ));
                }
            };
            let regex = Regex::new(pattern).map_err(|e| {
                Error::config(
                    format!("sync.client_source_repositories.{client}"),
                    format!("invalid {cluster} pattern: {e}"),
                )
            })?;
            patterns.insert(cluster, regex);
        }

        Ok(Self { strategy, patterns })
    }

    pub fn strategy(&self) -> ReleaseStrategy {
        self.strategy
    }

    /// Whether `release` is a candidate for `cluster`
    pub fn matches(&self, cluster: Cluster, release: &Release) -> bool {
        if release.draft {
            return false;
        }
        if cluster == Cluster::MainnetBeta && release.prerelease {
            return false;
        }
        let text = match self.strategy {
            ReleaseStrategy::Body => release.body.as_deref(),
            ReleaseStrategy::Title => release.name.as_deref(),
        };
        match (text, self.patterns.get(&cluster)) {
            (Some(text), Some(pattern)) => pattern.is_match(text),
            _ => false,
        }
    }
}

/// Result of one discovery pass over the release window
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Highest qualifying version for the configured cluster
    pub latest: Version,
    /// Highest qualifying version per cluster, where any matched
    pub per_cluster: HashMap<Cluster, Version>,
    /// Every non-draft release version seen in the window
    pub published: Vec<Version>,
}

impl Discovery {
    /// Whether `version` (core triple) has a published release
    pub fn is_published(&self, version: &Version) -> bool {
        self.published.iter().any(|v| v == version)
    }
}

/// Finds the newest release of a client suitable for a cluster
pub struct ReleaseDiscoverer {
    source: Arc<dyn ReleaseSource>,
    client: Client,
    cluster: Cluster,
    repo: RepoId,
    matcher: ReleaseMatcher,
    window: usize,
}

impl ReleaseDiscoverer {
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        client: Client,
        cluster: Cluster,
        repo: RepoId,
        matcher: ReleaseMatcher,
    ) -> Self {
        Self {
            source,
            client,
            cluster,
            repo,
            matcher,
            window: DEFAULT_RELEASE_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    /// Fetch the release window once and select per-cluster maxima
    pub async fn discover(&self) -> Result<Discovery> {
        let releases = self.source.recent_releases(&self.repo, self.window).await?;
        tracing::debug!(repo = %self.repo, count = releases.len(), "Fetched releases");

        let published: Vec<Version> = releases
            .iter()
            .filter(|r| !r.draft)
            .filter_map(|r| Version::parse(r.version_tag()).ok())
            .collect();

        let mut per_cluster = HashMap::new();
        for cluster in Cluster::ALL {
            let best = releases
                .iter()
                .filter(|r| self.matcher.matches(cluster, r))
                .filter_map(|r| match Version::parse(r.version_tag()) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::debug!(tag = %r.tag_name, error = %e, "Skipping unparseable release tag");
                        None
                    }
                })
                .max();
            if let Some(best) = best {
                per_cluster.insert(cluster, best);
            }
        }

        let mut latest = per_cluster
            .get(&self.cluster)
            .cloned()
            .ok_or_else(|| Error::NoMatchingReleases {
                client: self.client.to_string(),
                cluster: self.cluster.to_string(),
            })?;

        match self.cluster {
            Cluster::Testnet => {
                if let Some(mainnet) = per_cluster.get(&Cluster::MainnetBeta)
                    && *mainnet > latest
                {
                    tracing::warn!(
                        client = %self.client,
                        testnet_version = %latest,
                        mainnet_version = %mainnet,
                        "Latest mainnet release is newer than latest testnet release - using mainnet version"
                    );
                    latest = mainnet.clone();
                }
            }
            Cluster::MainnetBeta => {}
        }

        Ok(Discovery {
            latest,
            per_cluster,
            published,
        })
    }

    /// Highest qualifying version for the configured client and cluster
    pub async fn latest_version(&self) -> Result<Version> {
        Ok(self.discover().await?.latest)
    }
}
