//! Daily check-in against the provider.
//!
//! Authenticates with the stored access token as a Bearer token. Failures are
//! surfaced to the caller; there is no retry here.

use crate::config::{HttpTimeouts, OAuthConfig};
use crate::credentials::CredentialRecord;
use crate::error::{Error, Result};
use chrono::{Local, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = concat!("anyrouter-auto/", env!("CARGO_PKG_VERSION"));

/// Outcome of one check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinResult {
    pub success: bool,
    pub message: String,
    pub reward: Option<String>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl fmt::Display for CheckinResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        let line = format!(
            "[{}] {} {} {}",
            format_local_timestamp(self.timestamp),
            status,
            self.message,
            self.reward.as_deref().unwrap_or("")
        );
        f.write_str(line.trim())
    }
}

/// Renders epoch seconds as a local ISO-8601 timestamp.
pub(crate) fn format_local_timestamp(timestamp: f64) -> String {
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    match Utc.timestamp_opt(secs as i64, nanos).single() {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
        None => timestamp.to_string(),
    }
}

/// Check-in endpoint response. Every field is optional on the wire.
#[derive(Deserialize)]
struct CheckinResponse {
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reward: Option<Value>,
    #[serde(default)]
    timestamp: Option<f64>,
}

impl CheckinResponse {
    fn into_result(self, now: f64) -> CheckinResult {
        CheckinResult {
            success: self.success.as_ref().map_or(false, truthy),
            message: self.message.unwrap_or_default(),
            reward: self.reward.and_then(|reward| match reward {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }),
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    csrf_token: Option<String>,
}

/// HTTP client for the check-in and session endpoints.
pub struct CheckinClient {
    http_client: Client,
    checkin_url: String,
    session_url: String,
    checkin_timeout: Duration,
    session_timeout: Duration,
}

impl CheckinClient {
    pub fn new(config: &OAuthConfig, timeouts: &HttpTimeouts) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            checkin_url: config.checkin_endpoint(),
            session_url: config.session_endpoint(),
            checkin_timeout: timeouts.checkin(),
            session_timeout: timeouts.session(),
        })
    }

    /// Fetches the session CSRF token. Any failure is logged and yields `None`.
    pub async fn fetch_csrf_token(&self, record: &CredentialRecord) -> Option<String> {
        let response = self
            .http_client
            .get(&self.session_url)
            .bearer_auth(&record.access_token)
            .timeout(self.session_timeout)
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "Failed to refresh session metadata");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh session metadata");
                return None;
            }
        };

        match response.json::<SessionResponse>().await {
            Ok(session) => session.csrf_token,
            Err(e) => {
                warn!(error = %e, "Session metadata could not be decoded");
                None
            }
        }
    }

    /// POSTs `{"timestamp": <epoch secs>}` to the check-in endpoint.
    ///
    /// # Returns
    /// * `Ok(CheckinResult)` - Endpoint answered with JSON; `success` reflects its verdict
    /// * `Err(Error::Transport)` - Network failure, non-2xx status, or undecodable body
    pub async fn perform_checkin(&self, record: &CredentialRecord) -> Result<CheckinResult> {
        let now = Utc::now();
        let body = json!({ "timestamp": now.timestamp() });

        debug!(url = %self.checkin_url, "Sending check-in request");
        let response = self
            .http_client
            .post(&self.checkin_url)
            .bearer_auth(&record.access_token)
            .json(&body)
            .timeout(self.checkin_timeout)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Check-in request failed");
                Error::Transport(format!("check-in request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, "Check-in rejected");
            return Err(Error::Transport(describe_status(status, &text)));
        }

        let payload: CheckinResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("invalid check-in response: {}", e)))?;

        let now_secs = now.timestamp_millis() as f64 / 1000.0;
        let result = payload.into_result(now_secs);

        info!(
            success = result.success,
            reward = result.reward.as_deref().unwrap_or(""),
            "Check-in finished"
        );

        Ok(result)
    }
}

fn describe_status(status: StatusCode, body: &str) -> String {
    match status {
        StatusCode::UNAUTHORIZED => "check-in unauthorized: token expired or invalid".to_string(),
        _ => format!("check-in endpoint returned status {}: {}", status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> CheckinClient {
        let config = OAuthConfig {
            base_url: server.url(),
            ..OAuthConfig::default()
        };
        CheckinClient::new(&config, &HttpTimeouts::default()).unwrap()
    }

    fn record() -> CredentialRecord {
        CredentialRecord::new("tok1")
    }

    #[tokio::test]
    async fn test_perform_checkin_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/checkin")
            .match_header("authorization", "Bearer tok1")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Regex(r#"^\{"timestamp":\d+\}$"#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"message":"Checked in","reward":"5 credits","timestamp":1700000000.5}"#)
            .create_async()
            .await;

        let result = client_for(&server).perform_checkin(&record()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.message, "Checked in");
        assert_eq!(result.reward.as_deref(), Some("5 credits"));
        assert_eq!(result.timestamp, 1700000000.5);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_perform_checkin_defaults_timestamp_to_now() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/checkin")
            .with_status(200)
            .with_body(r#"{"success":false,"message":"Already checked in today"}"#)
            .create_async()
            .await;

        let before = Utc::now().timestamp() as f64;
        let result = client_for(&server).perform_checkin(&record()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.reward, None);
        assert!(result.timestamp >= before);
        assert!(result.timestamp <= Utc::now().timestamp() as f64 + 1.0);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_numeric_reward_is_stringified() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/checkin")
            .with_status(200)
            .with_body(r#"{"success":1,"reward":25}"#)
            .create_async()
            .await;

        let result = client_for(&server).perform_checkin(&record()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.reward.as_deref(), Some("25"));
        assert_eq!(result.message, "");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/checkin")
            .with_status(401)
            .create_async()
            .await;

        let result = client_for(&server).perform_checkin(&record()).await;
        assert!(matches!(result, Err(Error::Transport(_))));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_undecodable_body_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/checkin")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let result = client_for(&server).perform_checkin(&record()).await;
        assert!(matches!(result, Err(Error::Transport(_))));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let config = OAuthConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..OAuthConfig::default()
        };
        let client = CheckinClient::new(&config, &HttpTimeouts::default()).unwrap();

        let result = client.perform_checkin(&record()).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_fetch_csrf_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/session")
            .match_header("authorization", "Bearer tok1")
            .with_status(200)
            .with_body(r#"{"csrf_token":"csrf-123","user":"someone"}"#)
            .create_async()
            .await;

        let token = client_for(&server).fetch_csrf_token(&record()).await;
        assert_eq!(token.as_deref(), Some("csrf-123"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_csrf_token_failure_is_none() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/session")
            .with_status(500)
            .create_async()
            .await;

        assert_eq!(client_for(&server).fetch_csrf_token(&record()).await, None);

        mock.assert_async().await;
    }

    #[test]
    fn test_display() {
        let result = CheckinResult {
            success: true,
            message: "Checked in".to_string(),
            reward: Some("5".to_string()),
            timestamp: 1700000000.0,
        };
        let line = result.to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] SUCCESS Checked in 5"));

        let result = CheckinResult {
            success: false,
            message: "nope".to_string(),
            reward: None,
            timestamp: 1700000000.0,
        };
        assert!(result.to_string().ends_with("] FAILED nope"));
    }
}
