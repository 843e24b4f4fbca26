use std::path::Path;

use fieldsync_core::models::SyncStatus;
use fieldsync_core::Registration;

use crate::commands::common::{
    format_registration_lines, open_store, registration_to_list_item, RegistrationListItem,
};
use crate::error::CliError;

pub async fn list_registrations(
    limit: usize,
    status: Option<SyncStatus>,
    db_path: &Path,
) -> Result<Vec<Registration>, CliError> {
    let store = open_store(db_path)?;
    match status {
        Some(status) => {
            let mut registrations = store.list_by_status(&[status]).await?;
            registrations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            registrations.truncate(limit);
            Ok(registrations)
        }
        None => Ok(store.list(limit, 0).await?),
    }
}

pub async fn run_list(
    limit: usize,
    status: Option<SyncStatus>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let registrations = list_registrations(limit, status, db_path).await?;

    if as_json {
        let json_items = registrations
            .iter()
            .map(registration_to_list_item)
            .collect::<Vec<RegistrationListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if registrations.is_empty() {
        println!("No registrations yet.");
    } else {
        for line in format_registration_lines(&registrations) {
            println!("{line}");
        }
    }

    Ok(())
}
