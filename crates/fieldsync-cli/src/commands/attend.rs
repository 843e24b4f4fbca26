use std::path::Path;

use crate::commands::common::{open_store, render_attendance, resolve_registration};
use crate::error::CliError;

pub async fn run_attend(id: &str, day: u8, absent: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let registration = resolve_registration(&store, id).await?;

    let updated = store
        .set_attendance(registration.local_id, usize::from(day), !absent)
        .await?;
    println!("{}  {}", updated.uuid, render_attendance(&updated));
    Ok(())
}
