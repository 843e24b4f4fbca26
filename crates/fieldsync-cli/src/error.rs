use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Registration ID cannot be empty")]
    EmptyRegistrationId,
    #[error("Invalid field assignment '{0}', expected key=value")]
    InvalidAssignment(String),
    #[error("No field assignments provided; use --set key=value")]
    NoAssignments,
    #[error(
        "Sync is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY, or add a remote section to the config file."
    )]
    SyncNotConfigured,
    #[error(
        "Local database at {} is unreadable. Run `fieldsync db reset` to move it aside and start empty.",
        .0.display()
    )]
    CorruptDatabase(PathBuf),
}
