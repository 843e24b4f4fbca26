//! Supabase (PostgREST) implementation of the remote store contract.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{RemoteError, RemoteResult, RemoteRow, RemoteStore, CONFLICT_KEY};
use crate::config::RemoteConfig;
use crate::util::{compact_text, format_timestamp};
use crate::{Error, Result};

/// PostgREST client for the registrations table.
#[derive(Clone)]
pub struct SupabaseRemote {
    rest_url: String,
    anon_key: String,
    bearer: String,
    client: Client,
}

impl std::fmt::Debug for SupabaseRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseRemote")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SupabaseRemote {
    /// Build a client from configuration. `request_timeout` bounds every call,
    /// since the sync engine itself never cancels an in-flight request.
    pub fn new(config: &RemoteConfig, request_timeout: Duration) -> Result<Self> {
        let rest_url = config.rest_url()?;
        let anon_key = config
            .supabase_anon_key
            .clone()
            .ok_or_else(|| Error::Config("supabase_anon_key is not configured".into()))?;
        let bearer = config
            .access_token
            .clone()
            .unwrap_or_else(|| anon_key.clone());
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            rest_url,
            anon_key,
            bearer,
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, urlencoding::encode(table))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer)
            .header("Accept", "application/json")
    }
}

impl RemoteStore for SupabaseRemote {
    async fn upsert(&self, table: &str, row: &RemoteRow) -> RemoteResult<()> {
        let body = row
            .to_json()
            .map_err(|error| RemoteError::Permanent(error.to_string()))?;

        let request = self.authorized(
            self.client
                .post(self.table_url(table))
                .query(&[("on_conflict", CONFLICT_KEY)])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&body),
        );
        let response = request.send().await.map_err(transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn select_updated_since(&self, table: &str, since: i64) -> RemoteResult<Vec<Value>> {
        let filter = format!("gt.{}", format_timestamp(since));
        let request = self.authorized(self.client.get(self.table_url(table)).query(&[
            ("select", "*"),
            ("updated_at", filter.as_str()),
            ("order", "updated_at.asc"),
        ]));
        let response = request.send().await.map_err(transport_error)?;
        let response = ensure_success(response).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|error| RemoteError::Transient(format!("invalid select payload: {error}")))
    }
}

#[allow(clippy::needless_pass_by_value)]
fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Transient(error.to_string())
}

async fn ensure_success(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// Map an HTTP failure onto retry semantics.
///
/// 401 counts as transient because an expired session token is refreshed
/// out of band; every other 4xx will fail the same way on retry.
fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    let transient = status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::UNAUTHORIZED
        );
    if transient {
        RemoteError::Transient(message)
    } else {
        RemoteError::Permanent(message)
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    code: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message {
            let mut rendered = compact_text(&message);
            if let Some(code) = payload.code {
                rendered = format!("{rendered} [{code}]");
            }
            if let Some(details) = payload.details.or(payload.hint) {
                rendered = format!("{rendered}: {}", compact_text(&details));
            }
            return format!("{rendered} ({})", status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            supabase_url: Some("https://project.supabase.co/".into()),
            supabase_anon_key: Some("anon".into()),
            access_token: None,
            health_url: None,
        }
    }

    #[test]
    fn builds_table_url_under_rest_root() {
        let remote = SupabaseRemote::new(&config(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            remote.table_url("registrations"),
            "https://project.supabase.co/rest/v1/registrations"
        );
        assert_eq!(remote.bearer, "anon");
    }

    #[test]
    fn prefers_access_token_as_bearer() {
        let mut config = config();
        config.access_token = Some("session".into());
        let remote = SupabaseRemote::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(remote.bearer, "session");
        assert!(!format!("{remote:?}").contains("anon\""));
    }

    #[test]
    fn requires_configured_remote() {
        assert!(SupabaseRemote::new(&RemoteConfig::default(), Duration::from_secs(5)).is_err());
    }

    #[test]
    fn classifies_retryable_statuses_as_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::UNAUTHORIZED,
        ] {
            assert!(!classify_status(status, "").is_permanent(), "{status}");
        }
    }

    #[test]
    fn classifies_validation_failures_as_permanent() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::CONFLICT,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert!(classify_status(status, "").is_permanent(), "{status}");
        }
    }

    #[test]
    fn parses_postgrest_error_body() {
        let body = r#"{"code":"23502","details":"Failing row contains (...)","hint":null,"message":"null value in column \"age\" violates not-null constraint"}"#;
        let message = parse_api_error(StatusCode::BAD_REQUEST, body);
        assert!(message.starts_with("null value in column \"age\""));
        assert!(message.contains("[23502]"));
        assert!(message.ends_with("(400)"));
    }

    #[test]
    fn falls_back_to_raw_body_or_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }
}
