use std::path::Path;

use crate::commands::common::{open_store, parse_assignments, resolve_registration};
use crate::error::CliError;

pub async fn run_edit(id: &str, assignments: &[String], db_path: &Path) -> Result<(), CliError> {
    let patch = parse_assignments(assignments)?;
    let store = open_store(db_path)?;
    let registration = resolve_registration(&store, id).await?;

    // Reject edits that would leave required fields blank before touching the row
    registration.fields.merged(&patch)?.validate()?;

    let updated = store.update_fields(registration.local_id, &patch).await?;
    println!("{}", updated.uuid);
    Ok(())
}
