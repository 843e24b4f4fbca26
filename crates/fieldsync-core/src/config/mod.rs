//! Runtime configuration for the sync layer.
//!
//! Values come from an optional JSON file and are overlaid with environment
//! variables. Both sources go through the same normalization so that blank
//! values never count as configured.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_ACCESS_TOKEN: &str = "FIELDSYNC_ACCESS_TOKEN";
const ENV_HEALTH_URL: &str = "FIELDSYNC_HEALTH_URL";
const ENV_SYNC_INTERVAL: &str = "FIELDSYNC_SYNC_INTERVAL_SECS";
const ENV_HEARTBEAT_INTERVAL: &str = "FIELDSYNC_HEARTBEAT_INTERVAL_SECS";

/// Default remote table holding registrations.
pub const DEFAULT_TABLE: &str = "registrations";

/// Timers and limits of the sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Seconds between full push/pull cycles
    pub sync_interval_secs: u64,
    /// Seconds between connectivity probes
    pub heartbeat_interval_secs: u64,
    /// Timeout of a single health probe
    pub probe_timeout_secs: u64,
    /// Timeout of a single remote store request
    pub request_timeout_secs: u64,
    /// Remote/local logical table name
    pub table: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval_secs: 30,
            heartbeat_interval_secs: 15,
            probe_timeout_secs: 5,
            request_timeout_secs: 15,
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl SyncSettings {
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 || self.heartbeat_interval_secs == 0 {
            return Err(Error::Config(
                "sync and heartbeat intervals must be at least 1 second".into(),
            ));
        }
        if self.table.trim().is_empty() {
            return Err(Error::Config("table name must not be empty".into()));
        }
        Ok(())
    }
}

/// Supabase endpoint and credentials.
///
/// The anon key is a public key; the optional access token is the opaque
/// session token handed out by the identity provider.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub access_token: Option<String>,
    pub health_url: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key.as_ref().map(|_| "[REDACTED]"))
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("health_url", &self.health_url)
            .finish()
    }
}

impl RemoteConfig {
    /// Check if the remote store is configured
    pub const fn is_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> Result<String> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or_else(|| Error::Config("supabase_url is not configured".into()))?;
        Ok(url.trim_end_matches('/').to_string())
    }

    /// PostgREST root (`{supabase_url}/rest/v1`).
    pub fn rest_url(&self) -> Result<String> {
        Ok(format!("{}/rest/v1", self.base_url()?))
    }

    /// Endpoint probed for reachability; defaults to the PostgREST root.
    pub fn health_url(&self) -> Result<String> {
        match &self.health_url {
            Some(url) => Ok(url.clone()),
            None => Ok(format!("{}/", self.rest_url()?)),
        }
    }

    fn normalize(&mut self) {
        self.supabase_url = normalize_text_option(self.supabase_url.take());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.take());
        self.access_token = normalize_text_option(self.access_token.take());
        self.health_url = normalize_text_option(self.health_url.take());
    }

    fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("supabase_url", &self.supabase_url),
            ("health_url", &self.health_url),
        ] {
            if let Some(url) = url {
                if !is_http_url(url) {
                    return Err(Error::Config(format!(
                        "{name} must include http:// or https://"
                    )));
                }
            }
        }
        if self.supabase_url.is_some() != self.supabase_anon_key.is_some() {
            return Err(Error::Config(
                "supabase_url and supabase_anon_key must be set together".into(),
            ));
        }
        Ok(())
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Load the optional JSON file at `path` and overlay process environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        base.with_env(|key| env::var(key).ok())
    }

    /// Parse a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!("failed to parse {}: {error}", path.display()))
        })
    }

    /// Overlay values from a key lookup (normally the environment), then validate.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str| normalize_text_option(lookup(key));

        if let Some(url) = text(ENV_SUPABASE_URL) {
            self.remote.supabase_url = Some(url);
        }
        if let Some(key) = text(ENV_SUPABASE_ANON_KEY) {
            self.remote.supabase_anon_key = Some(key);
        }
        if let Some(token) = text(ENV_ACCESS_TOKEN) {
            self.remote.access_token = Some(token);
        }
        if let Some(url) = text(ENV_HEALTH_URL) {
            self.remote.health_url = Some(url);
        }
        if let Some(secs) = text(ENV_SYNC_INTERVAL) {
            self.sync.sync_interval_secs = parse_secs(ENV_SYNC_INTERVAL, &secs)?;
        }
        if let Some(secs) = text(ENV_HEARTBEAT_INTERVAL) {
            self.sync.heartbeat_interval_secs = parse_secs(ENV_HEARTBEAT_INTERVAL, &secs)?;
        }

        self.remote.normalize();
        self.remote.validate()?;
        self.sync.validate()?;
        Ok(self)
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{name} must be a whole number of seconds")))
}
