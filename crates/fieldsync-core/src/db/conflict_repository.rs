//! Conflict log repository implementation

#![allow(clippy::cast_possible_wrap)]

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{ConflictStrategy, RegistrationId, SyncConflict};

/// Trait for conflict log operations
pub trait ConflictRepository {
    /// Record a resolved pull conflict
    fn record(
        &self,
        uuid: &RegistrationId,
        local_updated_at: i64,
        incoming_updated_at: i64,
        strategy: ConflictStrategy,
    ) -> Result<()>;

    /// Most recently resolved conflicts first
    fn list(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn record(
        &self,
        uuid: &RegistrationId,
        local_updated_at: i64,
        incoming_updated_at: i64,
        strategy: ConflictStrategy,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO sync_conflicts
                 (uuid, local_updated_at, incoming_updated_at, resolved_at, strategy)
             VALUES (?, ?, ?, ?, ?)",
            params![
                uuid,
                local_updated_at,
                incoming_updated_at,
                now,
                strategy.as_str()
            ],
        )?;
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, local_updated_at, incoming_updated_at, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;

        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                let strategy: String = row.get(5)?;
                Ok(SyncConflict {
                    id: row.get(0)?,
                    uuid: row.get(1)?,
                    local_updated_at: row.get(2)?,
                    incoming_updated_at: row.get(3)?,
                    resolved_at: row.get(4)?,
                    strategy: ConflictStrategy::parse(&strategy)
                        .unwrap_or(ConflictStrategy::RemoteWins),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_record_and_list_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.conflicts();
        let first = RegistrationId::new();
        let second = RegistrationId::new();

        repo.record(&first, 100, 200, ConflictStrategy::RemoteWins)
            .unwrap();
        repo.record(&second, 300, 300, ConflictStrategy::LocalWins)
            .unwrap();

        let conflicts = repo.list(10).unwrap();
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].uuid, second.to_string());
        assert_eq!(conflicts[0].strategy, ConflictStrategy::LocalWins);
        assert_eq!(conflicts[1].incoming_updated_at, 200);

        assert_eq!(repo.list(1).unwrap().len(), 1);
    }
}
