//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which copy survived a last-write-wins resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Remote row was strictly newer and replaced unpushed local edits
    RemoteWins,
    /// Local edit was newer or equal; remote row ignored
    LocalWins,
}

impl ConflictStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoteWins => "remote_wins",
            Self::LocalWins => "local_wins",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "remote_wins" => Some(Self::RemoteWins),
            "local_wins" => Some(Self::LocalWins),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded pull conflict against a record that had unpushed local edits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Registration involved in the conflict
    pub uuid: String,
    /// Local record's timestamp when the conflict occurred
    pub local_updated_at: i64,
    /// Incoming remote row's timestamp
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution outcome
    pub strategy: ConflictStrategy,
}
