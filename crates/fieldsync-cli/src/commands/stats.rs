use std::collections::BTreeMap;
use std::path::Path;

use fieldsync_core::stats::CampaignStats;

use crate::commands::common::list_all_registrations;
use crate::error::CliError;

pub fn format_stats_lines(stats: &CampaignStats) -> Vec<String> {
    let mut lines = vec![
        format!("registered:        {}", stats.total_registered),
        format!("participants:      {}", stats.participants),
        format!("facilitators:      {}", stats.facilitators),
        format!("unique attendees:  {}", stats.unique_attendees),
        format!("avg daily:         {:.1}", stats.average_daily_attendance),
        String::new(),
        "attendance by day:".to_string(),
    ];
    lines.extend(
        stats
            .daily
            .iter()
            .map(|day| format!("  day {:>2}  {}", day.day, day.count)),
    );

    for (label, distribution) in [
        ("gender", &stats.demographics.gender),
        ("education", &stats.demographics.education),
        ("marital status", &stats.demographics.marital_status),
    ] {
        lines.push(String::new());
        lines.push(format!("{label}:"));
        lines.extend(format_distribution(distribution));
    }

    lines.push(String::new());
    lines.push(format!(
        "sync: {} synced, {} pending, {} failed, {} need review",
        stats.sync.synced, stats.sync.pending, stats.sync.failed, stats.sync.needs_review
    ));
    lines
}

fn format_distribution(distribution: &BTreeMap<String, usize>) -> Vec<String> {
    if distribution.is_empty() {
        return vec!["  (none)".to_string()];
    }
    distribution
        .iter()
        .map(|(value, count)| format!("  {value:<20}{count}"))
        .collect()
}

pub async fn run_stats(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let registrations = list_all_registrations(db_path).await?;
    let stats = CampaignStats::compute(&registrations);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for line in format_stats_lines(&stats) {
            println!("{line}");
        }
    }
    Ok(())
}
