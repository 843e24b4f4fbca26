//! Status indicator shown to field workers.

use serde::Serialize;

use crate::db::StatusCounts;

/// Unified sync indicator derived from connectivity and record states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Offline,
    Syncing,
    Synced,
    Error,
    Pending,
}

impl SyncState {
    /// Precedence: offline, then an active phase, then rejected records,
    /// then unpushed records.
    #[must_use]
    pub const fn derive(online: bool, syncing: bool, counts: &StatusCounts) -> Self {
        if !online {
            Self::Offline
        } else if syncing {
            Self::Syncing
        } else if counts.failed > 0 || counts.needs_review > 0 {
            Self::Error
        } else if counts.pending > 0 {
            Self::Pending
        } else {
            Self::Synced
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by [`SyncEngine::summary`](super::SyncEngine::summary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub state: SyncState,
    pub online: bool,
    pub counts: StatusCounts,
}
