use std::path::Path;

use fieldsync_core::export::render_json_export;

use crate::commands::common::list_all_registrations;
use crate::error::CliError;

pub async fn run_export(output_path: Option<&Path>, db_path: &Path) -> Result<(), CliError> {
    let registrations = list_all_registrations(db_path).await?;
    let rendered = render_json_export(&registrations)?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
