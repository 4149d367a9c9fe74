//! Credential persistence for the provider's OAuth tokens.
//!
//! A single [`CredentialRecord`] is kept on disk as JSON, optionally masked
//! with a passphrase-derived keystream.
//!
//! # Usage
//!
//! ```no_run
//! use anyrouter_auto::credentials::{CredentialRecord, CredentialStore};
//! use chrono::{Duration, Utc};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = CredentialStore::new("credentials.json", Some("hunter2"));
//!
//! let mut record = CredentialRecord::new("access-token");
//! record.expires_at = Some(Utc::now() + Duration::hours(1));
//! store.save(&record)?;
//!
//! if let Some(record) = store.load()? {
//!     println!("expired: {}", record.is_expired());
//! }
//!
//! store.clear()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! The passphrase mask is a disclosure deterrent only: it keeps tokens from
//! being readable at a glance, it does not provide confidentiality or
//! integrity. The file is written with owner-only permissions on Unix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod obfuscation;
mod storage;

pub use obfuscation::{decode, derive_keystream, encode};
pub use storage::CredentialStore;

/// Persisted tokens required to call the provider.
///
/// Created by a code exchange, updated in place by refresh, removed by clear.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// OAuth access token (sent as bearer token)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC). `None` means it never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client id the tokens were issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl CredentialRecord {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            client_id: None,
        }
    }

    /// True iff `expires_at` is set and the current time is at or past it.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// First characters of the access token, for display.
    pub fn token_preview(&self) -> String {
        let prefix: String = self.access_token.chars().take(6).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("client_id", &self.client_id)
            .finish()
    }
}
