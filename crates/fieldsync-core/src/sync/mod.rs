//! Bidirectional sync between the local store and the remote store.

mod engine;
mod scheduler;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{
    CycleReport, PhaseOutcome, PullOutcome, PullReport, PushOutcome, PushReport, SkipReason,
    SyncEngine,
};
pub use scheduler::AutoSync;
pub use state::{SyncState, SyncSummary};
