//! JSON export of registrations for hand-off and backups.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{Registration, SyncStatus};
use crate::util::format_timestamp;

/// One exported registration: domain fields flattened beside identity and
/// timestamps. `local_id`, `synced_at` and `last_error` stay on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRegistration {
    pub uuid: String,
    pub created_at: String,
    pub updated_at: String,
    pub sync_status: SyncStatus,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Convert a registration into an export record.
pub fn registration_to_export_item(
    registration: &Registration,
) -> serde_json::Result<ExportRegistration> {
    let fields = match serde_json::to_value(&registration.fields)? {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };

    Ok(ExportRegistration {
        uuid: registration.uuid.to_string(),
        created_at: format_timestamp(registration.created_at),
        updated_at: format_timestamp(registration.updated_at),
        sync_status: registration.sync_status,
        fields,
    })
}

/// Render registrations as pretty-printed JSON.
pub fn render_json_export(registrations: &[Registration]) -> serde_json::Result<String> {
    let items = registrations
        .iter()
        .map(registration_to_export_item)
        .collect::<serde_json::Result<Vec<_>>>()?;
    serde_json::to_string_pretty(&items)
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(timestamp_ms: i64) -> String {
    format!("fieldsync-export-{timestamp_ms}.json")
}
