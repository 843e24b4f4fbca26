//! Shared, thread-safe handle on the local database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{ConflictRepository, Database, RegistrationRepository, StatusCounts};
use crate::models::{
    ConflictStrategy, NewRegistration, Registration, RegistrationFields, RegistrationId,
    SyncConflict, SyncStatus,
};
use crate::remote::RemoteRow;
use crate::{Error, Result};

/// Cloneable handle used by the UI layer and the sync engine alike.
///
/// Every operation takes the lock for one synchronous `SQLite` call, so
/// writes from the UI never wait on network I/O.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path.
    ///
    /// A file that is not a valid database fails with [`Error::Corrupted`] and
    /// is left untouched; see [`LocalStore::quarantine`].
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).inspect_err(|error| {
            if matches!(error, Error::Corrupted(_)) {
                tracing::error!("Local database at {} is unreadable: {error}", db_path.display());
            }
        })?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Database::open_in_memory()?)),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Move the database file aside so the next open starts empty.
    ///
    /// Returns the backup path, or `None` when there was no file. Stale WAL
    /// and shared-memory files are removed.
    pub fn quarantine(db_path: &Path) -> Result<Option<PathBuf>> {
        let backup_path = if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .map_or_else(|| "fieldsync.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
            Some(backup_path)
        } else {
            None
        };

        for suffix in ["-wal", "-shm"] {
            let mut sidecar = db_path.as_os_str().to_owned();
            sidecar.push(suffix);
            let sidecar = PathBuf::from(sidecar);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
                tracing::warn!("Removed stale database file {}", sidecar.display());
            }
        }

        Ok(backup_path)
    }

    /// Validate and store a newly captured registration as pending.
    pub async fn create(&self, fields: RegistrationFields) -> Result<Registration> {
        fields.validate()?;
        self.insert(&NewRegistration::new(fields)).await
    }

    /// Store a registration exactly as given.
    pub async fn insert(&self, new: &NewRegistration) -> Result<Registration> {
        let db = self.db.lock().await;
        db.registrations().insert(new)
    }

    pub async fn get(&self, local_id: i64) -> Result<Option<Registration>> {
        let db = self.db.lock().await;
        db.registrations().get(local_id)
    }

    pub async fn find_by_uuid(&self, uuid: &RegistrationId) -> Result<Option<Registration>> {
        let db = self.db.lock().await;
        db.registrations().find_by_uuid(uuid)
    }

    /// Resolve a full uuid or an unambiguous uuid prefix.
    pub async fn resolve(&self, id_or_prefix: &str) -> Result<Registration> {
        if let Ok(uuid) = id_or_prefix.parse::<RegistrationId>() {
            return self
                .find_by_uuid(&uuid)
                .await?
                .ok_or_else(|| Error::NotFound(uuid.to_string()));
        }

        let db = self.db.lock().await;
        let mut matches = db.registrations().find_by_uuid_prefix(id_or_prefix, 2)?;
        match matches.len() {
            0 => Err(Error::NotFound(id_or_prefix.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::InvalidInput(format!(
                "id prefix '{id_or_prefix}' matches more than one registration"
            ))),
        }
    }

    /// List registrations newest-first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Registration>> {
        let db = self.db.lock().await;
        db.registrations().list(limit, offset)
    }

    pub async fn list_by_status(&self, statuses: &[SyncStatus]) -> Result<Vec<Registration>> {
        let db = self.db.lock().await;
        db.registrations().list_by_status(statuses)
    }

    /// Records the push phase should attempt: pending and failed.
    pub async fn pushable(&self) -> Result<Vec<Registration>> {
        self.list_by_status(&[SyncStatus::Pending, SyncStatus::Failed])
            .await
    }

    pub async fn scan_by_updated_at(&self) -> Result<Vec<Registration>> {
        let db = self.db.lock().await;
        db.registrations().scan_by_updated_at()
    }

    pub async fn max_updated_at(&self) -> Result<i64> {
        let db = self.db.lock().await;
        db.registrations().max_updated_at()
    }

    pub async fn count_by_status(&self) -> Result<StatusCounts> {
        let db = self.db.lock().await;
        db.registrations().count_by_status()
    }

    /// Merge `patch` into a record's fields and queue it for push.
    pub async fn update_fields(
        &self,
        local_id: i64,
        patch: &Map<String, Value>,
    ) -> Result<Registration> {
        let db = self.db.lock().await;
        db.registrations().update_fields(local_id, patch)
    }

    /// Mark one campaign day (1-based) as attended or missed.
    pub async fn set_attendance(
        &self,
        local_id: i64,
        day: usize,
        present: bool,
    ) -> Result<Registration> {
        let db = self.db.lock().await;
        let repo = db.registrations();
        let current = repo
            .get(local_id)?
            .ok_or_else(|| Error::NotFound(local_id.to_string()))?;

        let mut attendance = current.fields.attendance;
        attendance.set(day, present)?;
        let mut patch = Map::new();
        patch.insert("attendance".into(), serde_json::to_value(attendance)?);
        repo.update_fields(local_id, &patch)
    }

    pub async fn mark_synced(
        &self,
        local_id: i64,
        expected_updated_at: i64,
        pushed_updated_at: i64,
        synced_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        db.registrations()
            .mark_synced(local_id, expected_updated_at, pushed_updated_at, synced_at)
    }

    pub async fn mark_failed(
        &self,
        local_id: i64,
        expected_updated_at: i64,
        status: SyncStatus,
        error: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        db.registrations()
            .mark_failed(local_id, expected_updated_at, status, error)
    }

    pub async fn insert_remote(&self, row: &RemoteRow, synced_at: i64) -> Result<Registration> {
        let db = self.db.lock().await;
        db.registrations().insert_remote(row, synced_at)
    }

    pub async fn overwrite_from_remote(
        &self,
        local_id: i64,
        row: &RemoteRow,
        synced_at: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        db.registrations()
            .overwrite_from_remote(local_id, row, synced_at)
    }

    /// Move records in `status` back to pending; returns how many moved.
    pub async fn requeue(&self, status: SyncStatus) -> Result<usize> {
        let db = self.db.lock().await;
        db.registrations().requeue(status)
    }

    pub async fn record_conflict(
        &self,
        uuid: &RegistrationId,
        local_updated_at: i64,
        incoming_updated_at: i64,
        strategy: ConflictStrategy,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.conflicts()
            .record(uuid, local_updated_at, incoming_updated_at, strategy)
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        db.conflicts().list(limit)
    }
}
