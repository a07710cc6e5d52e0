//! Version values and range constraints.
//!
//! Versions are parsed with `semver` but compared on the numeric
//! `major.minor.patch` triple only: pre-release and build suffixes are
//! carried for display and never affect equality or ordering. This means
//! `1.18.0-beta.1 == 1.18.0-beta.2 == 1.18.0`.
//!
//! # Examples
//!
//! ```
//! use vsync_core::version::{Version, VersionConstraint};
//!
//! let constraint = VersionConstraint::parse(">=1.18.0, <=1.19.0").unwrap();
//! assert!(constraint.satisfies(&Version::parse("1.18.5").unwrap()));
//! assert!(constraint.satisfies(&Version::parse("v1.19.0-jito").unwrap()));
//! assert!(!constraint.satisfies(&Version::parse("1.20.0").unwrap()));
//! ```

mod diff;

pub use diff::{Direction, VersionDiff};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// An immutable semantic version ordered on its core triple
#[derive(Debug, Clone)]
pub struct Version {
    inner: semver::Version,
}

impl Version {
    /// Parse a version string.
    ///
    /// Accepts an optional leading `v` and `major.minor` (patch defaults to 0).
    pub fn parse(s: &str) -> Result<Self> {
        normalize_version(s)
            .map(|inner| Self { inner })
            .map_err(|reason| Error::InvalidVersion {
                version: s.to_string(),
                reason,
            })
    }

    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            inner: semver::Version::new(major, minor, patch),
        }
    }

    pub fn major(&self) -> u64 {
        self.inner.major
    }

    pub fn minor(&self) -> u64 {
        self.inner.minor
    }

    pub fn patch(&self) -> u64 {
        self.inner.patch
    }

    /// Pre-release label, if any (informational only)
    pub fn pre_release(&self) -> Option<&str> {
        (!self.inner.pre.is_empty()).then(|| self.inner.pre.as_str())
    }

    /// The `major.minor.patch` triple
    pub fn triple(&self) -> (u64, u64, u64) {
        (self.inner.major, self.inner.minor, self.inner.patch)
    }

    /// The version with pre-release and build metadata stripped
    pub fn core(&self) -> Version {
        Version::new(self.inner.major, self.inner.minor, self.inner.patch)
    }

    /// `major.minor.patch` as a string
    pub fn core_string(&self) -> String {
        format!(
            "{}.{}.{}",
            self.inner.major, self.inner.minor, self.inner.patch
        )
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.triple() == other.triple()
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple().cmp(&other.triple())
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.triple().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::str::FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Ne,
}

/// One bound of a range, compared on the core triple
#[derive(Debug, Clone)]
struct Specifier {
    op: CompareOp,
    version: Version,
}

impl Specifier {
    fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            CompareOp::Gte => candidate >= &self.version,
            CompareOp::Gt => candidate > &self.version,
            CompareOp::Lte => candidate <= &self.version,
            CompareOp::Lt => candidate < &self.version,
            CompareOp::Eq => candidate == &self.version,
            CompareOp::Ne => candidate != &self.version,
        }
    }
}

/// Range of acceptable client releases, such as the operator's
/// `allowed_version_range` or the bounds of a compliance record.
///
/// Comma-separated bounds are intersected.
#[derive(Debug, Clone)]
pub struct VersionConstraint {
    specifiers: Vec<Specifier>,
    /// As configured, used in logs and errors
    raw: String,
}

impl VersionConstraint {
    /// Parse a range like `>=1.18.0`, `>= 1.18.0, <= 1.19.0` or `!=2.0.1`.
    /// A version without an operator pins that exact release.
    pub fn parse(constraint: &str) -> Result<Self> {
        let raw = constraint.trim().to_string();
        let mut specifiers = Vec::new();

        for part in constraint.split(',').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            specifiers.push(parse_specifier(part)?);
        }

        if specifiers.is_empty() {
            return Err(Error::VersionConstraintParse {
                constraint: raw,
                reason: "empty constraint".to_string(),
            });
        }

        Ok(Self { specifiers, raw })
    }

    /// Range from optional inclusive bounds; `None` when both are absent.
    pub fn between(min: Option<&Version>, max: Option<&Version>) -> Option<Self> {
        let mut specifiers = Vec::new();
        let mut parts = Vec::new();
        if let Some(min) = min {
            parts.push(format!(">= {}", min.core_string()));
            specifiers.push(Specifier {
                op: CompareOp::Gte,
                version: min.core(),
            });
        }
        if let Some(max) = max {
            parts.push(format!("<= {}", max.core_string()));
            specifiers.push(Specifier {
                op: CompareOp::Lte,
                version: max.core(),
            });
        }
        (!specifiers.is_empty()).then(|| Self {
            specifiers,
            raw: parts.join(", "),
        })
    }

    /// Whether `version` lies inside the range
    pub fn satisfies(&self, version: &Version) -> bool {
        self.specifiers.iter().all(|spec| spec.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_specifier(s: &str) -> Result<Specifier> {
    let (op, version_str) = if let Some(rest) = s.strip_prefix(">=") {
        (CompareOp::Gte, rest)
    } else if let Some(rest) = s.strip_prefix("<=") {
        (CompareOp::Lte, rest)
    } else if let Some(rest) = s.strip_prefix("!=") {
        (CompareOp::Ne, rest)
    } else if let Some(rest) = s.strip_prefix("==") {
        (CompareOp::Eq, rest)
    } else if let Some(rest) = s.strip_prefix('>') {
        (CompareOp::Gt, rest)
    } else if let Some(rest) = s.strip_prefix('<') {
        (CompareOp::Lt, rest)
    } else {
        (CompareOp::Eq, s)
    };

    let version_str = version_str.trim();
    let version = normalize_version(version_str)
        .map(|inner| Version { inner })
        .map_err(|_| Error::VersionConstraintParse {
            constraint: s.to_string(),
            reason: format!("invalid version: {version_str}"),
        })?;

    Ok(Specifier { op, version })
}

/// Accept release tags as published (`v2.2.3`) and short `major.minor`
/// forms, which gain a zero patch.
fn normalize_version(s: &str) -> std::result::Result<semver::Version, String> {
    let s = s.trim();
    let s = s.strip_prefix('v').unwrap_or(s);

    if let Ok(v) = semver::Version::parse(s) {
        return Ok(v);
    }

    let with_patch = format!("{s}.0");
    semver::Version::parse(&with_patch).map_err(|e| format!("invalid version '{s}': {e}"))
}
