//! Remote store adapter contract.
//!
//! The sync engine only needs two remote operations: an upsert keyed on
//! `uuid` (so a retried push never duplicates a row) and a select of rows
//! changed after a low-water mark.

mod supabase;

use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{Registration, RegistrationFields, RegistrationId};
use crate::util::{format_timestamp, parse_timestamp};
use crate::{Error, Result};

pub use supabase::SupabaseRemote;

/// Column used as the upsert conflict target.
pub const CONFLICT_KEY: &str = "uuid";

/// Remote failures, tagged by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network trouble, timeouts, throttling or server-side faults
    #[error("Transient remote error: {0}")]
    Transient(String),
    /// Validation, permission or schema rejections that will fail again
    #[error("Remote rejected the request: {0}")]
    Permanent(String),
}

impl RemoteError {
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(message) | Self::Permanent(message) => message,
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Remote relational store holding one row per registration `uuid`.
pub trait RemoteStore: Send + Sync + 'static {
    /// Insert the row, or replace the existing row with the same `uuid`.
    fn upsert(&self, table: &str, row: &RemoteRow)
        -> impl Future<Output = RemoteResult<()>> + Send;

    /// Fetch raw rows whose `updated_at` is strictly greater than `since` (Unix ms).
    fn select_updated_since(
        &self,
        table: &str,
        since: i64,
    ) -> impl Future<Output = RemoteResult<Vec<Value>>> + Send;
}

/// Wire form of a registration: local-only bookkeeping stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRow {
    pub uuid: RegistrationId,
    pub fields: RegistrationFields,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RemoteRow {
    /// Build the row to push. A missing `updated_at` defaults to `now`.
    #[must_use]
    pub fn from_registration(registration: &Registration, now: i64) -> Self {
        let updated_at = if registration.updated_at > 0 {
            registration.updated_at
        } else {
            now
        };
        let created_at = if registration.created_at > 0 {
            registration.created_at
        } else {
            updated_at
        };

        Self {
            uuid: registration.uuid,
            fields: registration.fields.clone(),
            created_at,
            updated_at,
        }
    }

    /// Flatten into the JSON object sent to the remote store.
    pub fn to_json(&self) -> Result<Value> {
        let Value::Object(mut object) = serde_json::to_value(&self.fields)? else {
            return Err(Error::InvalidInput(
                "registration fields must serialize to an object".into(),
            ));
        };
        object.insert(CONFLICT_KEY.into(), Value::String(self.uuid.to_string()));
        object.insert(
            "created_at".into(),
            Value::String(format_timestamp(self.created_at)),
        );
        object.insert(
            "updated_at".into(),
            Value::String(format_timestamp(self.updated_at)),
        );
        Ok(Value::Object(object))
    }

    /// Decode a row returned by the remote store.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::InvalidInput("remote row must be a JSON object".into()));
        };
        Self::from_object(object)
    }

    fn from_object(object: Map<String, Value>) -> Result<Self> {
        let uuid = object
            .get(CONFLICT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("remote row has no uuid".into()))?
            .parse::<RegistrationId>()
            .map_err(|error| Error::InvalidInput(format!("remote row uuid: {error}")))?;
        let updated_at = object
            .get("updated_at")
            .and_then(parse_timestamp)
            .ok_or_else(|| {
                Error::InvalidInput(format!("remote row {uuid} has no valid updated_at"))
            })?;
        let created_at = object
            .get("created_at")
            .and_then(parse_timestamp)
            .unwrap_or(updated_at);
        let fields = RegistrationFields::from_object(object)?;

        Ok(Self {
            uuid,
            fields,
            created_at,
            updated_at,
        })
    }
}
