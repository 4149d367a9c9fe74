//! OAuth 2.0 authorization code flow against the provider.
//!
//! 1. `generate_state` + `build_authorization_url` (Unauthorized → Pending)
//! 2. The user opens the URL; the provider redirects to the loopback listener
//! 3. `wait_for_callback` captures `code` and `state`
//! 4. `exchange_code` trades the code for tokens and persists them (→ Authorized)
//! 5. `ensure_fresh_token` hands out a non-expired token, refreshing when needed

pub mod callback;
mod exchange;
mod state;

pub use callback::{await_callback, AuthorizationResult, CallbackListener};
pub use state::{generate_state, states_match};

use crate::config::{HttpTimeouts, OAuthConfig};
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::{Error, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Drives authorization, exchange and refresh for a single user.
pub struct AuthorizationFlow {
    config: OAuthConfig,
    timeouts: HttpTimeouts,
    store: Arc<CredentialStore>,
    http_client: reqwest::Client,
}

impl AuthorizationFlow {
    pub fn new(config: OAuthConfig, timeouts: HttpTimeouts, store: Arc<CredentialStore>) -> Self {
        Self {
            config,
            timeouts,
            store,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn generate_state(&self) -> String {
        generate_state()
    }

    /// Authorization endpoint URL with client_id, redirect_uri, response_type,
    /// scope and state query parameters.
    pub fn build_authorization_url(&self, state: &str) -> Result<String> {
        let client_id = self.config.require_client_id()?;
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.config.authorize_endpoint(),
            urlencoding::encode(client_id),
            urlencoding::encode(&self.config.redirect_uri()),
            urlencoding::encode(&self.config.scope),
            urlencoding::encode(state)
        ))
    }

    /// Listens on the configured redirect address for the provider's callback.
    pub async fn wait_for_callback(
        &self,
        state: &str,
        timeout: Duration,
    ) -> Result<AuthorizationResult> {
        await_callback(
            &self.config.redirect_host,
            self.config.redirect_port,
            &self.config.callback_path,
            state,
            timeout,
        )
        .await
    }

    /// Exchanges an authorization code for tokens and persists them.
    ///
    /// # Returns
    /// * `Ok(CredentialRecord)` - New record, already saved
    /// * `Err(Error::Exchange)` - Endpoint unreachable, non-2xx, malformed, or no access_token
    pub async fn exchange_code(&self, result: &AuthorizationResult) -> Result<CredentialRecord> {
        let client_id = self.config.require_client_id()?;
        let redirect_uri = self.config.redirect_uri();

        let form = [
            ("client_id", client_id),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("code", result.code.as_str()),
        ];

        debug!("Exchanging authorization code for token");
        let body = exchange::post_token_form(
            &self.http_client,
            &self.config.token_endpoint(),
            &form,
            self.timeouts.token(),
        )
        .await
        .map_err(Error::Exchange)?;

        let grant = exchange::parse_token_response(&body, Utc::now()).map_err(Error::Exchange)?;

        let record = CredentialRecord {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: grant.expires_at,
            scope: grant.scope,
            client_id: Some(client_id.to_string()),
        };

        self.store.save(&record)?;

        info!(
            has_refresh_token = record.refresh_token.is_some(),
            expires_at = ?record.expires_at,
            "Authorization code exchanged"
        );

        Ok(record)
    }

    /// Refreshes the access token and persists the updated record.
    ///
    /// Keeps the previous refresh token and scope when the provider does not
    /// return new ones. `client_id` is retained.
    pub async fn refresh(&self, mut record: CredentialRecord) -> Result<CredentialRecord> {
        let refresh_token = record
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingRefreshToken)?;

        let client_id = self
            .config
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| record.client_id.clone());
        let redirect_uri = self.config.redirect_uri();

        let mut form = vec![
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        if let Some(client_id) = client_id.as_deref() {
            form.push(("client_id", client_id));
        }

        info!("Refreshing access token");
        let body = exchange::post_token_form(
            &self.http_client,
            &self.config.token_endpoint(),
            &form,
            self.timeouts.token(),
        )
        .await
        .map_err(Error::Refresh)?;

        let grant = exchange::parse_token_response(&body, Utc::now()).map_err(Error::Refresh)?;

        record.access_token = grant.access_token;
        record.refresh_token = grant.refresh_token.or(record.refresh_token);
        record.expires_at = grant.expires_at;
        record.scope = grant.scope.or(record.scope);

        self.store.save(&record)?;

        info!(expires_at = ?record.expires_at, "Access token refreshed");

        Ok(record)
    }

    /// Loads the stored record, refreshing it first if expired.
    ///
    /// The only way callers obtain a token; it never returns an expired one.
    pub async fn ensure_fresh_token(&self) -> Result<CredentialRecord> {
        let record = self.store.load()?.ok_or(Error::NotAuthorized)?;

        if record.is_expired() {
            info!("Access token expired");
            return self.refresh(record).await;
        }

        Ok(record)
    }
}
