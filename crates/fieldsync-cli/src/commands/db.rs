use std::path::{Path, PathBuf};

use fieldsync_core::db::LocalStore;
use fieldsync_core::Error;

use crate::error::CliError;

/// Move the local database aside so the next command starts empty.
///
/// A database that opens cleanly is only moved with `force`.
pub fn run_db_reset(force: bool, db_path: &Path) -> Result<Option<PathBuf>, CliError> {
    match LocalStore::open_path(db_path) {
        Ok(_) if !force => {
            println!(
                "Local database at {} opens cleanly; pass --force to move it aside anyway.",
                db_path.display()
            );
            return Ok(None);
        }
        Ok(store) => drop(store),
        Err(Error::Corrupted(_)) => {}
        Err(error) => return Err(error.into()),
    }

    let backup = LocalStore::quarantine(db_path)?;
    match &backup {
        Some(path) => println!("Moved local database to {}", path.display()),
        None => println!("No local database at {}", db_path.display()),
    }
    Ok(backup)
}
