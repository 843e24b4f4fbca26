use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use fieldsync_core::events::{SyncEvent, Topic};
use fieldsync_core::sync::AutoSync;
use tokio::sync::mpsc;

use crate::commands::common::open_sync;
use crate::error::CliError;

pub fn describe_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::ConnectivityChanged { online: true } => "connectivity: online".to_string(),
        SyncEvent::ConnectivityChanged { online: false } => "connectivity: offline".to_string(),
        SyncEvent::SyncComplete => "push finished".to_string(),
        SyncEvent::DataUpdated => "remote changes merged".to_string(),
    }
}

pub async fn run_watch(db_path: &Path, config_path: Option<&Path>) -> Result<(), CliError> {
    let handles = open_sync(db_path, config_path)?;
    let events = handles.engine.events();
    for topic in [Topic::ConnectivityChanged, Topic::SyncComplete, Topic::DataUpdated] {
        events.subscribe(topic, |event| {
            println!("{}  {}", Local::now().format("%H:%M:%S"), describe_event(event));
        });
    }

    // No platform network signal from a terminal; timers drive the loop
    let (_platform, platform_rx) = mpsc::channel(1);
    let auto_sync = AutoSync::new(
        Arc::clone(&handles.engine),
        Arc::clone(&handles.monitor),
        &handles.config.sync,
    );

    println!(
        "Watching {} (every {}s). Press Ctrl-C to stop.",
        handles.engine.table(),
        handles.config.sync.sync_interval_secs
    );
    auto_sync
        .run(platform_rx, async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {error}");
            }
        })
        .await;

    let summary = handles.engine.summary().await?;
    println!(
        "Stopped: {} ({} pending, {} failed, {} need review)",
        summary.state, summary.counts.pending, summary.counts.failed, summary.counts.needs_review
    );
    Ok(())
}
