use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use fieldsync_core::config::AppConfig;
use fieldsync_core::connectivity::{Connectivity, ConnectivityMonitor, HttpHealthProbe};
use fieldsync_core::db::LocalStore;
use fieldsync_core::models::{Gender, SyncConflict};
use fieldsync_core::remote::SupabaseRemote;
use fieldsync_core::sync::{CycleReport, PhaseOutcome, SkipReason, SyncEngine};
use fieldsync_core::Registration;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CliError;

const ENV_DB_PATH: &str = "FIELDSYNC_DB_PATH";
const ENV_CONFIG_PATH: &str = "FIELDSYNC_CONFIG";

#[derive(Debug, Serialize)]
pub struct RegistrationListItem {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub gender: String,
    pub age: Option<u32>,
    pub place: Option<String>,
    pub days_attended: usize,
    pub sync_status: String,
    pub updated_at: i64,
    pub relative_time: String,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub uuid: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

pub type CliEngine = SyncEngine<SupabaseRemote>;
pub type CliMonitor = ConnectivityMonitor<HttpHealthProbe>;

/// Engine and monitor sharing one connectivity flag and event bus.
pub struct SyncHandles {
    pub engine: Arc<CliEngine>,
    pub monitor: Arc<CliMonitor>,
    pub config: AppConfig,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("fieldsync")
        .join("fieldsync.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> Option<PathBuf> {
    cli_config_path
        .or_else(|| env::var_os(ENV_CONFIG_PATH).map(PathBuf::from))
        .or_else(default_config_path)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fieldsync").join("config.json"))
}

pub fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    LocalStore::open_path(db_path).map_err(|error| match error {
        fieldsync_core::Error::Corrupted(_) => CliError::CorruptDatabase(db_path.to_path_buf()),
        other => other.into(),
    })
}

pub async fn list_all_registrations(db_path: &Path) -> Result<Vec<Registration>, CliError> {
    const PAGE_SIZE: usize = 500;

    let store = open_store(db_path)?;

    let mut registrations = Vec::new();
    let mut offset = 0usize;

    loop {
        let batch = store.list(PAGE_SIZE, offset).await?;
        let count = batch.len();
        registrations.extend(batch);

        if count < PAGE_SIZE {
            break;
        }
        offset += count;
    }

    Ok(registrations)
}

pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, CliError> {
    Ok(AppConfig::load(config_path)?)
}

/// Build the sync engine and connectivity monitor from configuration.
///
/// Fails with [`CliError::SyncNotConfigured`] when no remote is set up.
pub fn open_sync(db_path: &Path, config_path: Option<&Path>) -> Result<SyncHandles, CliError> {
    let config = load_config(config_path)?;
    if !config.remote.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let store = open_store(db_path)?;
    let remote = SupabaseRemote::new(&config.remote, config.sync.request_timeout())?;
    let probe = HttpHealthProbe::from_config(&config.remote, config.sync.probe_timeout())?;

    let engine = Arc::new(SyncEngine::new(
        store,
        remote,
        Connectivity::default(),
        config.sync.table.clone(),
    ));
    let monitor = Arc::new(ConnectivityMonitor::new(
        probe,
        engine.connectivity().clone(),
        engine.events().clone(),
        false,
    ));

    tracing::debug!("Sync configured against {}", config.remote.base_url()?);
    Ok(SyncHandles {
        engine,
        monitor,
        config,
    })
}

pub fn normalize_registration_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRegistrationId)
    } else {
        Ok(trimmed.to_ascii_lowercase())
    }
}

pub async fn resolve_registration(store: &LocalStore, id: &str) -> Result<Registration, CliError> {
    let normalized = normalize_registration_id(id)?;
    Ok(store.resolve(&normalized).await?)
}

/// Parse `key=value` pairs into a field patch.
///
/// Values that read as JSON numbers, booleans, arrays or `null` keep that
/// type; anything else is taken as text. Quote a value (`'"0712"'`) to force text.
pub fn parse_assignments(assignments: &[String]) -> Result<Map<String, Value>, CliError> {
    if assignments.is_empty() {
        return Err(CliError::NoAssignments);
    }

    let mut patch = Map::new();
    for assignment in assignments {
        let Some((key, raw)) = assignment.split_once('=') else {
            return Err(CliError::InvalidAssignment(assignment.clone()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidAssignment(assignment.clone()));
        }
        patch.insert(key.to_string(), parse_assignment_value(raw.trim()));
    }
    Ok(patch)
}

fn parse_assignment_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(_)) | Err(_) => Value::String(raw.to_string()),
        Ok(value) => value,
    }
}

pub fn registration_to_list_item(registration: &Registration) -> RegistrationListItem {
    let now_ms = Utc::now().timestamp_millis();
    let fields = &registration.fields;

    RegistrationListItem {
        uuid: registration.uuid.to_string(),
        name: fields.full_name(),
        kind: fields.kind.as_str().to_string(),
        gender: fields.gender.as_str().to_string(),
        age: fields.age,
        place: fields.place.clone(),
        days_attended: fields.attendance.days_attended(),
        sync_status: registration.sync_status.to_string(),
        updated_at: registration.updated_at,
        relative_time: format_relative_time(registration.updated_at, now_ms),
        last_error: registration.last_error.clone(),
    }
}

pub fn format_registration_lines(registrations: &[Registration]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    registrations
        .iter()
        .map(|registration| {
            let id = registration.uuid.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let name = truncate(&registration.fields.full_name(), 28);
            let gender = match registration.fields.gender {
                Gender::Unknown => "-",
                known => known.as_str(),
            };
            let relative_time = format_relative_time(registration.updated_at, now_ms);

            format!(
                "{short_id:<13}  {name:<28}  {gender:<1}  {:<12}  {relative_time}",
                registration.sync_status.as_str()
            )
        })
        .collect()
}

pub fn format_registration_detail(registration: &Registration) -> Vec<String> {
    let fields = &registration.fields;
    let mut lines = vec![
        format!("uuid:        {}", registration.uuid),
        format!("name:        {}", fields.full_name()),
        format!("type:        {}", fields.kind.as_str()),
        format!("gender:      {}", fields.gender.as_str()),
        format!(
            "age:         {}",
            fields.age.map_or_else(|| "-".to_string(), |age| age.to_string())
        ),
    ];

    for (label, value) in [
        ("contact", &fields.contact),
        ("place", &fields.place),
        ("education", &fields.education),
        ("marital", &fields.marital_status),
        ("facilitator", &fields.facilitator_uuid),
    ] {
        if let Some(value) = value {
            lines.push(format!("{:<13}{value}", format!("{label}:")));
        }
    }

    lines.push(format!(
        "attendance:  {} ({} days)",
        render_attendance(registration),
        fields.attendance.days_attended()
    ));
    lines.push(format!("status:      {}", registration.sync_status));
    if let Some(error) = &registration.last_error {
        lines.push(format!("last error:  {error}"));
    }
    lines.push(format!(
        "created:     {}",
        format_sync_timestamp(registration.created_at)
    ));
    lines.push(format!(
        "updated:     {}",
        format_sync_timestamp(registration.updated_at)
    ));
    if let Some(synced_at) = registration.synced_at {
        lines.push(format!("synced:      {}", format_sync_timestamp(synced_at)));
    }
    lines
}

/// One character per campaign day: `x` attended, `.` missed.
pub fn render_attendance(registration: &Registration) -> String {
    registration
        .fields
        .attendance
        .days()
        .iter()
        .map(|present| if *present { 'x' } else { '.' })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        uuid: conflict.uuid.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.to_string(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<11}  uuid={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.uuid,
                conflict.local_updated_at,
                conflict.incoming_updated_at
            )
        })
        .collect()
}

pub fn format_cycle_report(report: &CycleReport) -> Vec<String> {
    let push = match &report.push {
        Ok(PhaseOutcome::Completed(push)) => format!(
            "push: {} attempted, {} synced, {} failed, {} need review",
            push.attempted, push.synced, push.failed, push.needs_review
        ),
        Ok(PhaseOutcome::Skipped { reason }) => format!("push: skipped ({})", skip_label(*reason)),
        Err(error) => format!("push: error: {error}"),
    };
    let pull = match &report.pull {
        Ok(PhaseOutcome::Completed(pull)) => format!(
            "pull: {} fetched, {} inserted, {} updated, {} conflicts",
            pull.fetched, pull.inserted, pull.updated, pull.conflicts
        ),
        Ok(PhaseOutcome::Skipped { reason }) => format!("pull: skipped ({})", skip_label(*reason)),
        Err(error) => format!("pull: error: {error}"),
    };
    vec![push, pull]
}

const fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::InFlight => "already running",
        SkipReason::Offline => "offline",
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut truncated = text
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
