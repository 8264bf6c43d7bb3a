//! Conflict log model

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a diverged replay was reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    /// Disjoint edits, unioned without the strategy
    Merge,
    /// Overlapping edits, handed to the strategy
    Conflict,
}

impl ResolutionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown resolution kind '{other}'")),
        }
    }
}

/// Recorded divergence between a replayed write and the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Log row identifier
    pub id: i64,
    /// Type name of the entity involved
    pub entity_type: String,
    /// Id of the entity involved
    pub entity_id: String,
    /// Version the client based its edit on
    pub base_version: u64,
    /// Version the server held when the replay diverged
    pub server_version: u64,
    /// Merge or conflict
    pub kind: ResolutionKind,
    /// Fields touched by both sides (empty for merges)
    pub overlapping_fields: Vec<String>,
    /// Record timestamp (unix ms)
    pub recorded_at: i64,
}
