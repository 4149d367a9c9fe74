//! Token endpoint requests and response parsing.
//!
//! Shared by the authorization-code exchange and the refresh grant.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Token endpoint response (standard OAuth 2.0, lenient on `expires_in` type)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parsed token grant, with `expires_in` resolved to an absolute time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Parses a token endpoint body received at `now`.
///
/// Fails when the body is not JSON, carries an OAuth `error`, or lacks
/// `access_token`. No field is defaulted.
pub(crate) fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<TokenGrant, String> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed token response: {}", e))?;

    if let Some(error) = response.error {
        let description = response
            .error_description
            .unwrap_or_else(|| "no description".to_string());
        return Err(format!("provider returned {}: {}", error, description));
    }

    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "response is missing access_token".to_string())?;

    let expires_at = match response.expires_in {
        Some(value) => match expires_in_seconds(&value)? {
            Some(secs) => Some(
                now.checked_add_signed(secs)
                    .ok_or_else(|| format!("expires_in out of range: {}", value))?,
            ),
            None => None,
        },
        None => None,
    };

    Ok(TokenGrant {
        access_token,
        refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
        expires_at,
        scope: response.scope,
    })
}

/// Accepts a JSON number or numeric string. Zero means no expiry; a negative
/// value yields an already-past expiry.
fn expires_in_seconds(value: &Value) -> Result<Option<Duration>, String> {
    let secs = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|secs| secs.is_finite())
    .ok_or_else(|| format!("invalid expires_in: {}", value))?;

    if secs == 0.0 {
        return Ok(None);
    }
    // Clamp absurd lifetimes so the timestamp arithmetic stays in range
    let secs = secs.clamp(-(i32::MAX as f64), i32::MAX as f64);
    Ok(Some(Duration::milliseconds((secs * 1000.0) as i64)))
}

/// POSTs a form to the token endpoint and returns the response body.
pub(crate) async fn post_token_form(
    client: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
    timeout: std::time::Duration,
) -> Result<String, String> {
    tracing::debug!("Requesting token at {}", token_url);

    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| format!("failed to reach token endpoint: {}", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("failed to read token response: {}", e))?;

    if !status.is_success() {
        return Err(format!("token endpoint returned status {}: {}", status, body));
    }

    Ok(body)
}
