//! Pairwise version comparison

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use super::Version;

/// Direction of a version change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Same,
    Upgrade,
    Downgrade,
    /// Unreachable with integer triples; kept so the state stays representable
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Same => write!(f, "same"),
            Self::Upgrade => write!(f, "upgrade"),
            Self::Downgrade => write!(f, "downgrade"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Difference between the running version and a target version
#[derive(Debug, Clone)]
pub struct VersionDiff {
    pub from: Version,
    pub to: Version,
}

impl VersionDiff {
    pub fn new(from: Version, to: Version) -> Self {
        Self { from, to }
    }

    pub fn is_same_version(&self) -> bool {
        self.to == self.from
    }

    pub fn is_upgrade(&self) -> bool {
        self.to > self.from
    }

    pub fn is_downgrade(&self) -> bool {
        self.to < self.from
    }

    pub fn has_major_change(&self) -> bool {
        self.to.major() != self.from.major()
    }

    pub fn has_minor_change(&self) -> bool {
        self.to.minor() != self.from.minor()
    }

    pub fn has_patch_change(&self) -> bool {
        self.to.patch() != self.from.patch()
    }

    pub fn direction(&self) -> Direction {
        match self.to.partial_cmp(&self.from) {
            Some(Ordering::Equal) => Direction::Same,
            Some(Ordering::Greater) => Direction::Upgrade,
            Some(Ordering::Less) => Direction::Downgrade,
            None => Direction::Unknown,
        }
    }
}
