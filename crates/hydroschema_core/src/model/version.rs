//! Schema revision identifiers.
//!
//! # Invariants
//! - Revisions are monotonically increasing along the migration chain.
//! - The textual form stored in the database is zero padded to four digits.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

/// One point in the migration chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    pub const fn new(revision: u32) -> Self {
        Self(revision)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for SchemaVersion {
    type Err = ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<u32>().map(Self)
    }
}

impl From<u32> for SchemaVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Revision requested by an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRevision {
    /// The head of the migration chain.
    #[default]
    Latest,
    Version(SchemaVersion),
}

impl TargetRevision {
    pub fn resolve(self, head: SchemaVersion) -> SchemaVersion {
        match self {
            Self::Latest => head,
            Self::Version(version) => version,
        }
    }
}

impl From<SchemaVersion> for TargetRevision {
    fn from(value: SchemaVersion) -> Self {
        Self::Version(value)
    }
}

impl FromStr for TargetRevision {
    type Err = ParseIntError;

    /// Accepts `latest`/`head` or a numeric revision such as `0218`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "latest" | "head" => Ok(Self::Latest),
            other => other.parse().map(Self::Version),
        }
    }
}
