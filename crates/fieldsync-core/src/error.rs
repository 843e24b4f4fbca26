//! Error types for fieldsync-core

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local database error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Local storage ran out of space
    #[error("Local storage is full: {0}")]
    StorageFull(String),

    /// Local database file is corrupted or not a database
    #[error("Local database is corrupted: {0}")]
    Corrupted(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registration not found
    #[error("Registration not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store error surfaced at phase level
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::DiskFull) => Self::StorageFull(error.to_string()),
            Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => {
                Self::Corrupted(error.to_string())
            }
            _ => Self::Database(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn disk_full_maps_to_storage_full() {
        let error = Error::from(sqlite_failure(rusqlite::ffi::SQLITE_FULL));
        assert!(matches!(error, Error::StorageFull(_)));
    }

    #[test]
    fn corruption_maps_to_corrupted() {
        let error = Error::from(sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT));
        assert!(matches!(error, Error::Corrupted(_)));

        let error = Error::from(sqlite_failure(rusqlite::ffi::SQLITE_NOTADB));
        assert!(matches!(error, Error::Corrupted(_)));
    }

    #[test]
    fn other_failures_stay_database_errors() {
        let error = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(error, Error::Database(_)));
    }
}
