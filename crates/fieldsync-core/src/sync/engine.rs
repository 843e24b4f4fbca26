//! Push/pull reconciliation between the local store and the remote store.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use super::state::{SyncState, SyncSummary};
use crate::connectivity::Connectivity;
use crate::db::LocalStore;
use crate::events::{EventBus, SyncEvent};
use crate::models::{ConflictStrategy, SyncStatus};
use crate::remote::{RemoteRow, RemoteStore};
use crate::util::now_millis;
use crate::{Error, Result};

/// Why a phase returned without doing any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The same phase is already running on this engine
    InFlight,
    /// The connectivity monitor reports the remote as unreachable
    Offline,
}

/// Result of one push or pull invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PhaseOutcome<T> {
    Skipped { reason: SkipReason },
    Completed(T),
}

impl<T> PhaseOutcome<T> {
    pub const fn report(&self) -> Option<&T> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }

    pub const fn skipped(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason } => Some(*reason),
            Self::Completed(_) => None,
        }
    }
}

/// Per-record counts of a push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    pub needs_review: usize,
    /// Pushed, but edited locally while the upsert was in flight
    pub superseded: usize,
}

/// Per-row counts of a pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub invalid: usize,
    pub conflicts: usize,
}

impl PullReport {
    /// Rows that changed local data.
    #[must_use]
    pub const fn merged(&self) -> usize {
        self.inserted + self.updated
    }
}

pub type PushOutcome = PhaseOutcome<PushReport>;
pub type PullOutcome = PhaseOutcome<PullReport>;

/// Outcome of [`SyncEngine::run_cycle`]; each phase fails independently.
#[derive(Debug)]
pub struct CycleReport {
    pub push: Result<PushOutcome>,
    pub pull: Result<PullOutcome>,
}

impl CycleReport {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.push.is_ok() && self.pull.is_ok()
    }
}

/// Held while a phase runs; clears the flag on drop, including on early return.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciles one local table with its remote counterpart.
///
/// Push and pull each allow one invocation at a time per engine; a second
/// call while one is running returns immediately as skipped. Push and pull
/// may overlap each other.
pub struct SyncEngine<R> {
    store: LocalStore,
    remote: R,
    connectivity: Connectivity,
    events: EventBus,
    table: String,
    pushing: AtomicBool,
    pulling: AtomicBool,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(
        store: LocalStore,
        remote: R,
        connectivity: Connectivity,
        table: impl Into<String>,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            events: EventBus::new(),
            table: table.into(),
            pushing: AtomicBool::new(false),
            pulling: AtomicBool::new(false),
        }
    }

    /// Bus this engine publishes on; hand a clone to the connectivity monitor.
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether a push or pull is currently running.
    pub fn is_syncing(&self) -> bool {
        self.pushing.load(Ordering::Acquire) || self.pulling.load(Ordering::Acquire)
    }

    /// Upload every pending or failed registration.
    ///
    /// `sync-complete` is published whenever this call ran (it is not
    /// published when skipped as in flight).
    pub async fn push_pending(&self) -> Result<PushOutcome> {
        let Some(_guard) = InFlight::acquire(&self.pushing) else {
            tracing::debug!("Push already in progress; skipping");
            return Ok(PhaseOutcome::Skipped {
                reason: SkipReason::InFlight,
            });
        };

        let result = self.push_records().await;
        if let Err(error) = &result {
            tracing::error!("Push aborted: {error}");
        }
        self.events.publish(SyncEvent::SyncComplete);
        result
    }

    async fn push_records(&self) -> Result<PushOutcome> {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline; push deferred");
            return Ok(PhaseOutcome::Skipped {
                reason: SkipReason::Offline,
            });
        }

        let pending = self.store.pushable().await?;
        let mut report = PushReport::default();
        if pending.is_empty() {
            return Ok(PhaseOutcome::Completed(report));
        }

        tracing::info!("Pushing {} registrations to {}", pending.len(), self.table);
        for record in pending {
            report.attempted += 1;
            let row = RemoteRow::from_registration(&record, now_millis());

            match self.remote.upsert(&self.table, &row).await {
                Ok(()) => {
                    let marked = self
                        .store
                        .mark_synced(record.local_id, record.updated_at, row.updated_at, now_millis())
                        .await?;
                    if marked {
                        report.synced += 1;
                        tracing::debug!(uuid = %record.uuid, "Registration synced");
                    } else {
                        report.superseded += 1;
                        tracing::debug!(uuid = %record.uuid, "Registration edited during push; left pending");
                    }
                }
                Err(error) => {
                    let status = if error.is_permanent() {
                        SyncStatus::NeedsReview
                    } else {
                        SyncStatus::Failed
                    };
                    tracing::warn!(uuid = %record.uuid, status = %status, "Push rejected: {error}");

                    let marked = self
                        .store
                        .mark_failed(record.local_id, record.updated_at, status, error.message())
                        .await?;
                    if !marked {
                        report.superseded += 1;
                    } else if status == SyncStatus::NeedsReview {
                        report.needs_review += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            "Push finished: {} synced, {} failed, {} need review",
            report.synced,
            report.failed,
            report.needs_review
        );
        Ok(PhaseOutcome::Completed(report))
    }

    /// Merge remote rows changed after the local low-water mark.
    ///
    /// A remote row replaces the local record only when strictly newer; on
    /// equal timestamps the local copy is kept.
    pub async fn pull_updates(&self) -> Result<PullOutcome> {
        let Some(_guard) = InFlight::acquire(&self.pulling) else {
            tracing::debug!("Pull already in progress; skipping");
            return Ok(PhaseOutcome::Skipped {
                reason: SkipReason::InFlight,
            });
        };

        if !self.connectivity.is_online() {
            tracing::debug!("Offline; pull deferred");
            return Ok(PhaseOutcome::Skipped {
                reason: SkipReason::Offline,
            });
        }

        let since = self.store.max_updated_at().await?;
        let rows = self
            .remote
            .select_updated_since(&self.table, since)
            .await
            .map_err(Error::Remote)?;

        let mut report = PullReport {
            fetched: rows.len(),
            ..PullReport::default()
        };
        for value in rows {
            match RemoteRow::from_json(value) {
                Ok(row) => self.merge_row(&row, &mut report).await?,
                Err(error) => {
                    report.invalid += 1;
                    tracing::warn!("Skipping malformed remote row: {error}");
                }
            }
        }

        if report.merged() > 0 {
            tracing::info!(
                "Pulled {} new and {} updated registrations",
                report.inserted,
                report.updated
            );
            self.events.publish(SyncEvent::DataUpdated);
        }
        Ok(PhaseOutcome::Completed(report))
    }

    async fn merge_row(&self, row: &RemoteRow, report: &mut PullReport) -> Result<()> {
        let Some(local) = self.store.find_by_uuid(&row.uuid).await? else {
            self.store.insert_remote(row, now_millis()).await?;
            report.inserted += 1;
            return Ok(());
        };

        let unpushed = local.sync_status != SyncStatus::Synced;
        let strategy = if row.updated_at > local.updated_at
            && self
                .store
                .overwrite_from_remote(local.local_id, row, now_millis())
                .await?
        {
            report.updated += 1;
            ConflictStrategy::RemoteWins
        } else {
            report.unchanged += 1;
            ConflictStrategy::LocalWins
        };

        if unpushed {
            tracing::warn!(
                uuid = %row.uuid,
                local_updated_at = local.updated_at,
                incoming_updated_at = row.updated_at,
                "Resolved pull conflict: {strategy}"
            );
            self.store
                .record_conflict(&row.uuid, local.updated_at, row.updated_at, strategy)
                .await?;
            report.conflicts += 1;
        }
        Ok(())
    }

    /// Push then pull. A failing phase is logged and reported, never propagated.
    pub async fn run_cycle(&self) -> CycleReport {
        let push = self.push_pending().await;
        let pull = self.pull_updates().await;
        if let Err(error) = &pull {
            tracing::error!("Pull aborted: {error}");
        }
        CycleReport { push, pull }
    }

    /// Record counts plus the derived indicator.
    pub async fn summary(&self) -> Result<SyncSummary> {
        let counts = self.store.count_by_status().await?;
        let online = self.connectivity.is_online();
        Ok(SyncSummary {
            state: SyncState::derive(online, self.is_syncing(), &counts),
            online,
            counts,
        })
    }
}
