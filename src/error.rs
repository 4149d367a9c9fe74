//! Error taxonomy for authorization, token lifecycle and check-in.
//!
//! File stores report `anyhow::Error`; those surface here as [`Error::Storage`].

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the authorization flow, the callback listener and the
/// check-in client.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (e.g. no OAuth client id).
    #[error("configuration error: {0}")]
    Config(String),

    /// No valid authorization callback arrived in time.
    #[error("authorization callback not received within {0:?}")]
    Timeout(Duration),

    /// The loopback listener could not be started.
    #[error("callback listener failed: {0}")]
    Listener(#[source] std::io::Error),

    /// Malformed token endpoint response during code exchange.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// Malformed token endpoint response during refresh.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("refresh token missing; re-run authorize")]
    MissingRefreshToken,

    #[error("credentials missing; run authorize first")]
    NotAuthorized,

    /// Network or decode failure talking to the remote service.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
