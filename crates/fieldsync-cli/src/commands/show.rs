use std::path::Path;

use crate::commands::common::{format_registration_detail, open_store, resolve_registration};
use crate::error::CliError;

pub async fn run_show(id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let registration = resolve_registration(&store, id).await?;

    for line in format_registration_detail(&registration) {
        println!("{line}");
    }
    Ok(())
}
