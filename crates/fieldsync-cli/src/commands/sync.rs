use std::path::Path;

use fieldsync_core::models::SyncStatus;

use crate::commands::common::{
    format_cycle_report, format_sync_conflict_lines, open_store, open_sync, sync_conflict_to_item,
    SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path, config_path: Option<&Path>) -> Result<(), CliError> {
    let handles = open_sync(db_path, config_path)?;
    handles.monitor.check().await;
    if !handles.monitor.is_online() {
        println!("Remote is unreachable; registrations stay queued.");
    }

    let report = handles.engine.run_cycle().await;
    for line in format_cycle_report(&report) {
        println!("{line}");
    }

    report.push?;
    report.pull?;
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_requeue(db_path: &Path) -> Result<usize, CliError> {
    let store = open_store(db_path)?;
    let requeued = store.requeue(SyncStatus::NeedsReview).await?;
    println!("Requeued {requeued} registration(s) for the next push.");
    Ok(requeued)
}
