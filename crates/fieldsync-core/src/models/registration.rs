//! Registration model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Number of campaign days tracked in the attendance vector.
pub const ATTENDANCE_DAYS: usize = 12;

/// Field names owned by the sync layer that a field patch may never touch.
const RESERVED_KEYS: [&str; 7] = [
    "uuid",
    "local_id",
    "created_at",
    "updated_at",
    "sync_status",
    "synced_at",
    "last_error",
];

/// Client-assigned identifier of a registration, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(Uuid);

impl RegistrationId {
    /// Create a new unique registration ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RegistrationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Whether a record takes part in the next push cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Written locally, not yet confirmed by the remote store
    #[default]
    Pending,
    /// Local content matches the last known remote content
    Synced,
    /// Last push was rejected with a transient error; retried next cycle
    Failed,
    /// Last push was rejected permanently; excluded until requeued
    NeedsReview,
}

impl SyncStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Synced, Self::Failed, Self::NeedsReview];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::NeedsReview => "needs_review",
        }
    }

    /// Records in these states are picked up by the push phase.
    #[must_use]
    pub const fn is_pushable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            "needs_review" | "review" => Ok(Self::NeedsReview),
            other => Err(Error::InvalidInput(format!("unknown sync status: {other}"))),
        }
    }
}

/// Role of the registered person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum PersonKind {
    #[default]
    Participant,
    Facilitator,
    Other,
}

impl PersonKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Facilitator => "facilitator",
            Self::Other => "other",
        }
    }
}

impl From<Option<String>> for PersonKind {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            None | Some("") => Self::Participant,
            Some(kind) if kind.eq_ignore_ascii_case("participant") => Self::Participant,
            Some(kind) if kind.eq_ignore_ascii_case("facilitator") => Self::Facilitator,
            Some(_) => Self::Other,
        }
    }
}

impl From<PersonKind> for String {
    fn from(value: PersonKind) -> Self {
        value.as_str().to_string()
    }
}

/// Normalized gender code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Gender {
    M,
    F,
    #[default]
    Unknown,
}

impl Gender {
    /// Normalize free-form input: standard codes (1 = M, 2 = F) and Setswana
    /// (Monna = M, Mosadi = F) are accepted.
    #[must_use]
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "M" | "MALE" | "1" | "MONNA" => Self::M,
            "F" | "FEMALE" | "2" | "MOSADI" => Self::F,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::M => "M",
            Self::F => "F",
            Self::Unknown => "Unknown",
        }
    }
}

impl From<Option<String>> for Gender {
    fn from(value: Option<String>) -> Self {
        value.as_deref().map_or(Self::Unknown, Self::normalize)
    }
}

impl From<Gender> for String {
    fn from(value: Gender) -> Self {
        value.as_str().to_string()
    }
}

/// Fixed-length attendance vector, one flag per campaign day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<Value>>", into = "Vec<bool>")]
pub struct Attendance([bool; ATTENDANCE_DAYS]);

impl Attendance {
    #[must_use]
    pub const fn days(&self) -> &[bool; ATTENDANCE_DAYS] {
        &self.0
    }

    /// Mark a 1-based campaign day as attended or not.
    pub fn set(&mut self, day: usize, present: bool) -> Result<()> {
        if day == 0 || day > ATTENDANCE_DAYS {
            return Err(Error::InvalidInput(format!(
                "attendance day must be between 1 and {ATTENDANCE_DAYS}, got {day}"
            )));
        }
        self.0[day - 1] = present;
        Ok(())
    }

    /// 1-based lookup; out-of-range days are never attended.
    #[must_use]
    pub fn attended(&self, day: usize) -> bool {
        day.checked_sub(1)
            .and_then(|index| self.0.get(index))
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn days_attended(&self) -> usize {
        self.0.iter().filter(|present| **present).count()
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_u64() == Some(1),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "x"
        ),
        _ => false,
    }
}

impl From<Option<Vec<Value>>> for Attendance {
    fn from(value: Option<Vec<Value>>) -> Self {
        let mut days = [false; ATTENDANCE_DAYS];
        for (slot, flag) in days.iter_mut().zip(value.unwrap_or_default().iter()) {
            *slot = is_truthy(flag);
        }
        Self(days)
    }
}

impl From<Attendance> for Vec<bool> {
    fn from(value: Attendance) -> Self {
        value.0.to_vec()
    }
}

/// Flat domain attributes of a registration.
///
/// Columns this client does not know about are kept in `extra` so that rows
/// pulled from the remote store are pushed back without losing data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistrationFields {
    #[serde(default, deserialize_with = "lenient::text")]
    pub first_name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub last_name: String,
    #[serde(rename = "type", default, deserialize_with = "lenient::coded")]
    pub kind: PersonKind,
    #[serde(default, deserialize_with = "lenient::coded")]
    pub gender: Gender,
    #[serde(default, deserialize_with = "lenient::optional_count")]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub contact: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub place: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub education: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub marital_status: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub facilitator_uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_count")]
    pub participants_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient::optional_count")]
    pub books_distributed: Option<u32>,
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient::attendance")]
    pub attendance: Attendance,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Column decoders that accept whatever a nullable, loosely typed remote
/// column holds. A value of the wrong shape decodes to the field's default.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::Attendance;

    fn scalar_text(value: Value) -> Option<String> {
        match value {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn optional_text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(scalar_text(Value::deserialize(deserializer)?))
    }

    pub fn optional_count<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u32>, D::Error> {
        let count = match Value::deserialize(deserializer)? {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        };
        Ok(count.and_then(|count| u32::try_from(count).ok()))
    }

    pub fn coded<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: From<Option<String>>,
    {
        Ok(T::from(scalar_text(Value::deserialize(deserializer)?)))
    }

    pub fn attendance<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Attendance, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => Attendance::from(Some(items)),
            _ => Attendance::default(),
        })
    }
}

impl RegistrationFields {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Check the attributes a field worker must capture before saving.
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "first name and last name are required".into(),
            ));
        }
        if self.age.is_none() {
            return Err(Error::InvalidInput("age is required".into()));
        }
        if self.gender == Gender::Unknown {
            return Err(Error::InvalidInput("gender is required (M or F)".into()));
        }
        Ok(())
    }

    /// Return a copy with `patch` merged over the current attributes.
    ///
    /// Keys owned by the sync layer (`uuid`, timestamps, status) are rejected.
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Self> {
        if let Some(key) = patch
            .keys()
            .find(|key| RESERVED_KEYS.contains(&key.as_str()))
        {
            return Err(Error::InvalidInput(format!("field '{key}' cannot be edited")));
        }

        let Value::Object(mut current) = serde_json::to_value(self)? else {
            return Err(Error::InvalidInput("fields must serialize to an object".into()));
        };
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        Ok(serde_json::from_value(Value::Object(current))?)
    }

    /// Decode attributes from a remote/local JSON object, dropping keys owned
    /// by the sync layer.
    pub fn from_object(mut object: Map<String, Value>) -> Result<Self> {
        for key in RESERVED_KEYS {
            object.remove(key);
        }
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

/// A registration as held in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Local-only auto-incrementing key
    pub local_id: i64,
    /// Client-assigned merge key, never changes
    pub uuid: RegistrationId,
    /// Domain attributes
    pub fields: RegistrationFields,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms), authoritative for conflicts
    pub updated_at: i64,
    /// Push state
    pub sync_status: SyncStatus,
    /// When the last push succeeded (Unix ms)
    pub synced_at: Option<i64>,
    /// Message of the last remote rejection
    pub last_error: Option<String>,
}

/// A registration captured locally but not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRegistration {
    pub uuid: RegistrationId,
    pub fields: RegistrationFields,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NewRegistration {
    /// Stamp a fresh uuid and timestamps on the given attributes.
    #[must_use]
    pub fn new(fields: RegistrationFields) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            uuid: RegistrationId::new(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_registration_id_unique_and_parses() {
        let first = RegistrationId::new();
        let second = RegistrationId::new();
        assert_ne!(first, second);

        let parsed: RegistrationId = first.as_str().parse().unwrap();
        assert_eq!(first, parsed);
    }

    #[test]
    fn test_sync_status_round_trip_names() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert_eq!("needs-review".parse::<SyncStatus>().unwrap(), SyncStatus::NeedsReview);
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_only_pending_and_failed_are_pushable() {
        assert!(SyncStatus::Pending.is_pushable());
        assert!(SyncStatus::Failed.is_pushable());
        assert!(!SyncStatus::Synced.is_pushable());
        assert!(!SyncStatus::NeedsReview.is_pushable());
    }

    #[test]
    fn test_gender_normalization() {
        assert_eq!(Gender::normalize("male"), Gender::M);
        assert_eq!(Gender::normalize(" Monna "), Gender::M);
        assert_eq!(Gender::normalize("2"), Gender::F);
        assert_eq!(Gender::normalize("Mosadi"), Gender::F);
        assert_eq!(Gender::normalize("?"), Gender::Unknown);
    }

    #[test]
    fn test_attendance_decodes_loose_values_and_pads() {
        let attendance: Attendance =
            serde_json::from_value(json!([true, 1, "1", false, 0, "no"])).unwrap();
        assert_eq!(attendance.days_attended(), 3);
        assert!(attendance.attended(3));
        assert!(!attendance.attended(12));

        let empty: Attendance = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(empty.days_attended(), 0);
    }

    #[test]
    fn test_attendance_rejects_out_of_range_day() {
        let mut attendance = Attendance::default();
        assert!(attendance.set(0, true).is_err());
        assert!(attendance.set(13, true).is_err());
        attendance.set(12, true).unwrap();
        assert!(attendance.attended(12));
        assert_eq!(serde_json::to_value(attendance).unwrap().as_array().unwrap().len(), 12);
    }

    #[test]
    fn test_fields_keep_unknown_columns() {
        let fields = RegistrationFields::from_object(
            json!({
                "uuid": "ignored",
                "first_name": "Neo",
                "last_name": "Kgosi",
                "type": "facilitator",
                "gender": "Female",
                "age": 31,
                "district": "Kweneng"
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
        .unwrap();

        assert_eq!(fields.kind, PersonKind::Facilitator);
        assert_eq!(fields.gender, Gender::F);
        assert_eq!(fields.extra.get("district"), Some(&json!("Kweneng")));
        assert!(!fields.extra.contains_key("uuid"));

        let encoded = serde_json::to_value(&fields).unwrap();
        assert_eq!(encoded["district"], json!("Kweneng"));
        assert_eq!(encoded["type"], json!("facilitator"));
    }

    #[test]
    fn test_merged_applies_patch() {
        let fields = RegistrationFields {
            first_name: "Tumelo".into(),
            last_name: "Dube".into(),
            age: Some(20),
            ..RegistrationFields::default()
        };
        let patch = json!({"age": 21, "place": "Mochudi"});
        let merged = fields.merged(patch.as_object().unwrap()).unwrap();

        assert_eq!(merged.age, Some(21));
        assert_eq!(merged.place.as_deref(), Some("Mochudi"));
        assert_eq!(merged.first_name, "Tumelo");
    }

    #[test]
    fn test_merged_rejects_reserved_keys() {
        let patch = json!({"uuid": "x"});
        let result = RegistrationFields::default().merged(patch.as_object().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_requires_core_attributes() {
        let mut fields = RegistrationFields {
            first_name: "Kabo".into(),
            last_name: "Molefe".into(),
            ..RegistrationFields::default()
        };
        assert!(fields.validate().is_err());

        fields.age = Some(44);
        assert!(fields.validate().is_err());

        fields.gender = Gender::M;
        assert!(fields.validate().is_ok());
        assert_eq!(fields.full_name(), "Kabo Molefe");
    }

    #[test]
    fn test_from_object_tolerates_null_and_loose_columns() {
        let row = json!({
            "uuid": "0190f1c2-7a1b-7c3d-8e9f-0a1b2c3d4e5f",
            "first_name": "Neo",
            "last_name": null,
            "type": null,
            "gender": 2,
            "age": "33",
            "contact": 71234567,
            "place": null,
            "participants_count": null,
            "books_distributed": -4,
            "attendance": null,
        });
        let fields = RegistrationFields::from_object(row.as_object().unwrap().clone()).unwrap();

        assert_eq!(fields.first_name, "Neo");
        assert_eq!(fields.last_name, "");
        assert_eq!(fields.kind, PersonKind::Participant);
        assert_eq!(fields.gender, Gender::F);
        assert_eq!(fields.age, Some(33));
        assert_eq!(fields.contact.as_deref(), Some("71234567"));
        assert_eq!(fields.place, None);
        assert_eq!(fields.participants_count, None);
        assert_eq!(fields.books_distributed, None);
        assert_eq!(fields.attendance, Attendance::default());
        assert!(fields.extra.is_empty());
    }
}
