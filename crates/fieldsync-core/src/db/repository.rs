//! Registration repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{NewRegistration, Registration, RegistrationFields, RegistrationId, SyncStatus};
use crate::remote::RemoteRow;
use crate::util::now_millis;

const COLUMNS: &str =
    "local_id, uuid, fields, created_at, updated_at, sync_status, synced_at, last_error";

/// Number of records in each sync state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
    pub needs_review: usize,
}

impl StatusCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.synced + self.failed + self.needs_review
    }

    /// Records the next push will pick up.
    #[must_use]
    pub const fn unsynced(&self) -> usize {
        self.pending + self.failed
    }
}

/// Trait for registration storage operations
pub trait RegistrationRepository {
    /// Append a new registration; the store assigns `local_id`
    fn insert(&self, new: &NewRegistration) -> Result<Registration>;

    /// Get a registration by local id
    fn get(&self, local_id: i64) -> Result<Option<Registration>>;

    /// Get a registration by uuid (lowest `local_id` if duplicated)
    fn find_by_uuid(&self, uuid: &RegistrationId) -> Result<Option<Registration>>;

    /// Registrations whose uuid starts with `prefix`
    fn find_by_uuid_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<Registration>>;

    /// List registrations, newest first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Registration>>;

    /// Registrations in any of `statuses`, oldest first
    fn list_by_status(&self, statuses: &[SyncStatus]) -> Result<Vec<Registration>>;

    /// All registrations ordered by `updated_at` ascending
    fn scan_by_updated_at(&self) -> Result<Vec<Registration>>;

    /// Largest `updated_at` in the store, 0 when empty
    fn max_updated_at(&self) -> Result<i64>;

    /// Count registrations per sync status
    fn count_by_status(&self) -> Result<StatusCounts>;

    /// Merge `patch` into the fields and queue the record for push
    fn update_fields(&self, local_id: i64, patch: &Map<String, Value>) -> Result<Registration>;

    /// Mark a pushed record synced unless it was edited after `expected_updated_at`
    fn mark_synced(
        &self,
        local_id: i64,
        expected_updated_at: i64,
        pushed_updated_at: i64,
        synced_at: i64,
    ) -> Result<bool>;

    /// Record a push rejection unless the record was edited meanwhile
    fn mark_failed(
        &self,
        local_id: i64,
        expected_updated_at: i64,
        status: SyncStatus,
        error: &str,
    ) -> Result<bool>;

    /// Store a row first seen on the remote side as synced
    fn insert_remote(&self, row: &RemoteRow, synced_at: i64) -> Result<Registration>;

    /// Replace a local record with a strictly newer remote row
    fn overwrite_from_remote(&self, local_id: i64, row: &RemoteRow, synced_at: i64)
        -> Result<bool>;

    /// Move every record in `status` back to pending
    fn requeue(&self, status: SyncStatus) -> Result<usize>;
}

/// `SQLite` implementation of `RegistrationRepository`
pub struct SqliteRegistrationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRegistrationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a registration from a database row
    fn parse_registration(row: &rusqlite::Row<'_>) -> rusqlite::Result<Registration> {
        let fields: String = row.get(2)?;
        let fields = serde_json::from_str::<RegistrationFields>(&fields).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(error))
        })?;

        Ok(Registration {
            local_id: row.get(0)?,
            uuid: row.get(1)?,
            fields,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            sync_status: row.get(5)?,
            synced_at: row.get(6)?,
            last_error: row.get(7)?,
        })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Registration>> {
        let mut stmt = self.conn.prepare(sql)?;
        let registrations = stmt
            .query_map(params, Self::parse_registration)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(registrations)
    }

    fn require(&self, local_id: i64) -> Result<Registration> {
        self.get(local_id)?
            .ok_or_else(|| Error::NotFound(local_id.to_string()))
    }
}

impl RegistrationRepository for SqliteRegistrationRepository<'_> {
    fn insert(&self, new: &NewRegistration) -> Result<Registration> {
        let fields = serde_json::to_string(&new.fields)?;

        self.conn.execute(
            "INSERT INTO registrations (uuid, fields, created_at, updated_at, sync_status)
             VALUES (?, ?, ?, ?, ?)",
            params![
                new.uuid,
                fields,
                new.created_at,
                new.updated_at,
                SyncStatus::Pending
            ],
        )?;

        let local_id = self.conn.last_insert_rowid();
        tracing::debug!(local_id, uuid = %new.uuid, "Stored registration");
        self.require(local_id)
    }

    fn get(&self, local_id: i64) -> Result<Option<Registration>> {
        let registration = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM registrations WHERE local_id = ?"),
                params![local_id],
                Self::parse_registration,
            )
            .optional()?;
        Ok(registration)
    }

    fn find_by_uuid(&self, uuid: &RegistrationId) -> Result<Option<Registration>> {
        let registration = self
            .conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM registrations WHERE uuid = ?
                     ORDER BY local_id ASC LIMIT 1"
                ),
                params![uuid],
                Self::parse_registration,
            )
            .optional()?;
        Ok(registration)
    }

    fn find_by_uuid_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<Registration>> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(Error::InvalidInput(format!(
                "'{prefix}' is not a registration id prefix"
            )));
        }

        self.query(
            &format!(
                "SELECT {COLUMNS} FROM registrations WHERE uuid LIKE ? || '%'
                 ORDER BY local_id ASC LIMIT ?"
            ),
            params![prefix, limit as i64],
        )
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Registration>> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM registrations
                 ORDER BY created_at DESC, local_id DESC
                 LIMIT ? OFFSET ?"
            ),
            params![limit as i64, offset as i64],
        )
    }

    fn list_by_status(&self, statuses: &[SyncStatus]) -> Result<Vec<Registration>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM registrations WHERE sync_status IN ({placeholders})
                 ORDER BY local_id ASC"
            ),
            params_from_iter(statuses.iter()),
        )
    }

    fn scan_by_updated_at(&self) -> Result<Vec<Registration>> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM registrations ORDER BY updated_at ASC, local_id ASC"
            ),
            [],
        )
    }

    fn max_updated_at(&self) -> Result<i64> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(updated_at) FROM registrations", [], |row| {
                    row.get(0)
                })?;
        Ok(max.unwrap_or(0))
    }

    fn count_by_status(&self) -> Result<StatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT sync_status, COUNT(*) FROM registrations GROUP BY sync_status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, SyncStatus>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status {
                SyncStatus::Pending => counts.pending = count,
                SyncStatus::Synced => counts.synced = count,
                SyncStatus::Failed => counts.failed = count,
                SyncStatus::NeedsReview => counts.needs_review = count,
            }
        }
        Ok(counts)
    }

    fn update_fields(&self, local_id: i64, patch: &Map<String, Value>) -> Result<Registration> {
        let current = self.require(local_id)?;
        let fields = current.fields.merged(patch)?;
        let updated_at = now_millis().max(current.updated_at + 1);

        self.conn.execute(
            "UPDATE registrations SET fields = ?, updated_at = ?, sync_status = ?
             WHERE local_id = ?",
            params![
                serde_json::to_string(&fields)?,
                updated_at,
                SyncStatus::Pending,
                local_id
            ],
        )?;

        self.require(local_id)
    }

    fn mark_synced(
        &self,
        local_id: i64,
        expected_updated_at: i64,
        pushed_updated_at: i64,
        synced_at: i64,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE registrations
             SET sync_status = ?, synced_at = ?, updated_at = ?, last_error = NULL
             WHERE local_id = ? AND updated_at = ?",
            params![
                SyncStatus::Synced,
                synced_at,
                pushed_updated_at,
                local_id,
                expected_updated_at
            ],
        )?;
        Ok(rows == 1)
    }

    fn mark_failed(
        &self,
        local_id: i64,
        expected_updated_at: i64,
        status: SyncStatus,
        error: &str,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE registrations SET sync_status = ?, last_error = ?
             WHERE local_id = ? AND updated_at = ?",
            params![status, error, local_id, expected_updated_at],
        )?;
        Ok(rows == 1)
    }

    fn insert_remote(&self, row: &RemoteRow, synced_at: i64) -> Result<Registration> {
        self.conn.execute(
            "INSERT INTO registrations
                 (uuid, fields, created_at, updated_at, sync_status, synced_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                row.uuid,
                serde_json::to_string(&row.fields)?,
                row.created_at,
                row.updated_at,
                SyncStatus::Synced,
                synced_at
            ],
        )?;

        self.require(self.conn.last_insert_rowid())
    }

    fn overwrite_from_remote(
        &self,
        local_id: i64,
        row: &RemoteRow,
        synced_at: i64,
    ) -> Result<bool> {
        // Guarded so an edit that landed after the comparison is never clobbered.
        let rows = self.conn.execute(
            "UPDATE registrations
             SET fields = ?, created_at = ?, updated_at = ?, sync_status = ?,
                 synced_at = ?, last_error = NULL
             WHERE local_id = ? AND updated_at < ?",
            params![
                serde_json::to_string(&row.fields)?,
                row.created_at,
                row.updated_at,
                SyncStatus::Synced,
                synced_at,
                local_id,
                row.updated_at
            ],
        )?;
        Ok(rows == 1)
    }

    fn requeue(&self, status: SyncStatus) -> Result<usize> {
        if status == SyncStatus::Pending {
            return Ok(0);
        }
        let rows = self.conn.execute(
            "UPDATE registrations SET sync_status = ? WHERE sync_status = ?",
            params![SyncStatus::Pending, status],
        )?;
        Ok(rows)
    }
}

impl ToSql for SyncStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SyncStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(error.to_string().into()))
    }
}

impl ToSql for RegistrationId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RegistrationId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: uuid::Error| FromSqlError::Other(Box::new(error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Gender;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn fields(first_name: &str) -> RegistrationFields {
        RegistrationFields {
            first_name: first_name.into(),
            last_name: "Molefe".into(),
            gender: Gender::M,
            age: Some(24),
            ..RegistrationFields::default()
        }
    }

    fn new_registration(first_name: &str, updated_at: i64) -> NewRegistration {
        NewRegistration {
            uuid: RegistrationId::new(),
            fields: fields(first_name),
            created_at: updated_at,
            updated_at,
        }
    }

    fn remote_row(uuid: RegistrationId, first_name: &str, updated_at: i64) -> RemoteRow {
        RemoteRow {
            uuid,
            fields: fields(first_name),
            created_at: 1,
            updated_at,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup();
        let repo = db.registrations();

        let stored = repo.insert(&new_registration("Kagiso", 100)).unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.synced_at, None);

        let fetched = repo.get(stored.local_id).unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert_eq!(
            repo.find_by_uuid(&stored.uuid).unwrap().unwrap().local_id,
            stored.local_id
        );
        assert!(repo.get(stored.local_id + 1).unwrap().is_none());
    }

    #[test]
    fn test_insert_always_appends() {
        let db = setup();
        let repo = db.registrations();

        let first = repo.insert(&new_registration("A", 100)).unwrap();
        let mut duplicate = new_registration("B", 200);
        duplicate.uuid = first.uuid;
        let second = repo.insert(&duplicate).unwrap();

        assert_ne!(first.local_id, second.local_id);
        // Lowest local id wins lookups by uuid
        assert_eq!(
            repo.find_by_uuid(&first.uuid).unwrap().unwrap().local_id,
            first.local_id
        );
    }

    #[test]
    fn test_find_by_uuid_prefix() {
        let db = setup();
        let repo = db.registrations();

        let stored = repo.insert(&new_registration("Neo", 100)).unwrap();
        let id = stored.uuid.as_str();

        let matches = repo.find_by_uuid_prefix(&id[..8], 10).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].uuid, stored.uuid);
        assert!(repo.find_by_uuid_prefix("zz'; --", 10).is_err());
    }

    #[test]
    fn test_list_by_status_and_counts() {
        let db = setup();
        let repo = db.registrations();

        let a = repo.insert(&new_registration("A", 100)).unwrap();
        let b = repo.insert(&new_registration("B", 200)).unwrap();
        repo.insert(&new_registration("C", 300)).unwrap();

        assert!(repo.mark_synced(a.local_id, 100, 100, 500).unwrap());
        assert!(repo
            .mark_failed(b.local_id, 200, SyncStatus::Failed, "timeout")
            .unwrap());

        let pushable = repo
            .list_by_status(&[SyncStatus::Pending, SyncStatus::Failed])
            .unwrap();
        let names: Vec<_> = pushable
            .iter()
            .map(|r| r.fields.first_name.as_str())
            .collect();
        assert_eq!(names, vec!["B", "C"]);

        let counts = repo.count_by_status().unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 1,
                synced: 1,
                failed: 1,
                needs_review: 0,
            }
        );
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.unsynced(), 2);
    }

    #[test]
    fn test_max_updated_at() {
        let db = setup();
        let repo = db.registrations();
        assert_eq!(repo.max_updated_at().unwrap(), 0);

        repo.insert(&new_registration("A", 300)).unwrap();
        repo.insert(&new_registration("B", 100)).unwrap();
        assert_eq!(repo.max_updated_at().unwrap(), 300);

        let scanned: Vec<_> = repo
            .scan_by_updated_at()
            .unwrap()
            .into_iter()
            .map(|r| r.updated_at)
            .collect();
        assert_eq!(scanned, vec![100, 300]);
    }

    #[test]
    fn test_update_fields_merges_and_requeues() {
        let db = setup();
        let repo = db.registrations();

        let stored = repo.insert(&new_registration("Thato", i64::MAX / 2)).unwrap();
        repo.mark_synced(stored.local_id, stored.updated_at, stored.updated_at, 1)
            .unwrap();

        let patch = json!({"place": "Mochudi", "age": 30});
        let updated = repo
            .update_fields(stored.local_id, patch.as_object().unwrap())
            .unwrap();

        assert_eq!(updated.fields.place.as_deref(), Some("Mochudi"));
        assert_eq!(updated.fields.age, Some(30));
        assert_eq!(updated.fields.first_name, "Thato");
        assert_eq!(updated.sync_status, SyncStatus::Pending);
        // Strictly increases even when the stored value is ahead of the clock
        assert_eq!(updated.updated_at, stored.updated_at + 1);
    }

    #[test]
    fn test_update_fields_rejects_reserved_keys() {
        let db = setup();
        let repo = db.registrations();
        let stored = repo.insert(&new_registration("Thato", 100)).unwrap();

        let patch = json!({"updated_at": 5});
        assert!(repo
            .update_fields(stored.local_id, patch.as_object().unwrap())
            .is_err());
        assert!(matches!(
            repo.update_fields(999, &Map::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_mark_synced_skips_records_edited_in_flight() {
        let db = setup();
        let repo = db.registrations();
        let stored = repo.insert(&new_registration("Mpho", 100)).unwrap();

        let patch = json!({"contact": "71234567"});
        let edited = repo
            .update_fields(stored.local_id, patch.as_object().unwrap())
            .unwrap();

        assert!(!repo.mark_synced(stored.local_id, 100, 100, 500).unwrap());
        assert!(!repo
            .mark_failed(stored.local_id, 100, SyncStatus::NeedsReview, "bad")
            .unwrap());

        let current = repo.get(stored.local_id).unwrap().unwrap();
        assert_eq!(current.sync_status, SyncStatus::Pending);
        assert_eq!(current.updated_at, edited.updated_at);
    }

    #[test]
    fn test_remote_insert_and_guarded_overwrite() {
        let db = setup();
        let repo = db.registrations();
        let uuid = RegistrationId::new();

        let inserted = repo.insert_remote(&remote_row(uuid, "Remote", 200), 900).unwrap();
        assert_eq!(inserted.sync_status, SyncStatus::Synced);
        assert_eq!(inserted.synced_at, Some(900));

        // Not strictly newer: refused
        assert!(!repo
            .overwrite_from_remote(inserted.local_id, &remote_row(uuid, "Same", 200), 950)
            .unwrap());

        assert!(repo
            .overwrite_from_remote(inserted.local_id, &remote_row(uuid, "Newer", 300), 1000)
            .unwrap());
        let current = repo.find_by_uuid(&uuid).unwrap().unwrap();
        assert_eq!(current.fields.first_name, "Newer");
        assert_eq!(current.updated_at, 300);
        assert_eq!(current.synced_at, Some(1000));
    }

    #[test]
    fn test_requeue_needs_review() {
        let db = setup();
        let repo = db.registrations();
        let stored = repo.insert(&new_registration("Lorato", 100)).unwrap();
        repo.mark_failed(stored.local_id, 100, SyncStatus::NeedsReview, "23502")
            .unwrap();

        assert_eq!(repo.requeue(SyncStatus::NeedsReview).unwrap(), 1);
        assert_eq!(repo.requeue(SyncStatus::NeedsReview).unwrap(), 0);

        let current = repo.get(stored.local_id).unwrap().unwrap();
        assert_eq!(current.sync_status, SyncStatus::Pending);
        assert_eq!(current.last_error.as_deref(), Some("23502"));
    }

    #[test]
    fn test_survives_reopen_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fieldsync.db");

        let uuid = {
            let db = Database::open(&path).unwrap();
            db.registrations()
                .insert(&new_registration("Onalenna", 100))
                .unwrap()
                .uuid
        };

        let db = Database::open(&path).unwrap();
        let stored = db.registrations().find_by_uuid(&uuid).unwrap().unwrap();
        assert_eq!(stored.fields.first_name, "Onalenna");
        assert_eq!(stored.sync_status, SyncStatus::Pending);
    }
}
