use std::path::Path;

use fieldsync_core::sync::{SyncState, SyncSummary};

use crate::commands::common::{load_config, open_store, open_sync};
use crate::error::CliError;

/// Summarize local records; probes the remote when one is configured.
pub async fn load_summary(
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(SyncSummary, bool), CliError> {
    let config = load_config(config_path)?;
    if !config.remote.is_configured() {
        let counts = open_store(db_path)?.count_by_status().await?;
        let summary = SyncSummary {
            state: SyncState::derive(false, false, &counts),
            online: false,
            counts,
        };
        return Ok((summary, false));
    }

    let handles = open_sync(db_path, config_path)?;
    handles.monitor.check().await;
    Ok((handles.engine.summary().await?, true))
}

pub async fn run_status(
    as_json: bool,
    db_path: &Path,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let (summary, configured) = load_summary(db_path, config_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let remote = match (configured, summary.online) {
        (false, _) => "not configured",
        (true, true) => "reachable",
        (true, false) => "unreachable",
    };
    println!("state:        {}", summary.state);
    println!("remote:       {remote}");
    println!("pending:      {}", summary.counts.pending);
    println!("failed:       {}", summary.counts.failed);
    println!("needs review: {}", summary.counts.needs_review);
    println!("synced:       {}", summary.counts.synced);
    Ok(())
}
