//! One-shot loopback listener for the OAuth redirect.
//!
//! Serves `GET <callback_path>?code=..&state=..` on a local address until the
//! first request carrying a matching state arrives, then shuts down.
//!
//! | Request | Response |
//! |---|---|
//! | other path | 404 |
//! | `code` or `state` missing | 400 |
//! | `state` mismatch | 401 |
//! | first valid request | 200 + HTML confirmation |
//! | valid request after completion | 410 |
//!
//! Each listener owns its expected state and completion channel, so separate
//! attempts do not share anything.

use super::state::states_match;
use crate::error::{Error, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on waiting for the server task after shutdown is signalled
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const CONFIRMATION_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization complete</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Authorization complete.</h2>
<p>You may close this window and return to the terminal.</p>
</body>
</html>"#;

/// Redirect parameters captured by the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationResult {
    pub code: String,
    pub state: String,
    pub received_at: DateTime<Utc>,
}

/// Rejections for callback requests
enum CallbackRejection {
    MissingParameters,
    StateMismatch,
    AlreadyCompleted,
}

impl IntoResponse for CallbackRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CallbackRejection::MissingParameters => {
                (StatusCode::BAD_REQUEST, "Missing query parameters")
            }
            CallbackRejection::StateMismatch => (StatusCode::UNAUTHORIZED, "State mismatch"),
            CallbackRejection::AlreadyCompleted => {
                (StatusCode::GONE, "Authorization already completed")
            }
        };

        (status, message).into_response()
    }
}

/// Redirect query parameters
#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Per-attempt handler state
#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    sender: Arc<Mutex<Option<oneshot::Sender<AuthorizationResult>>>>,
}

fn callback_router(path: &str, state: CallbackState) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .with_state(state)
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> std::result::Result<Html<&'static str>, CallbackRejection> {
    if let Some(error) = &params.error {
        warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Provider redirected with an OAuth error"
        );
    }

    let (code, received_state) = match (params.code, params.state) {
        (Some(code), Some(s)) if !code.is_empty() && !s.is_empty() => (code, s),
        _ => return Err(CallbackRejection::MissingParameters),
    };

    if !states_match(&state.expected_state, &received_state) {
        warn!("Callback state mismatch (possible CSRF attempt)");
        return Err(CallbackRejection::StateMismatch);
    }

    let Some(sender) = state.sender.lock().await.take() else {
        debug!("Ignoring repeated callback after completion");
        return Err(CallbackRejection::AlreadyCompleted);
    };

    let result = AuthorizationResult {
        code,
        state: received_state,
        received_at: Utc::now(),
    };
    if sender.send(result).is_err() {
        debug!("Callback arrived after the waiter gave up");
    }

    Ok(Html(CONFIRMATION_PAGE))
}

/// Bound, not yet serving, callback listener.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Binds `host:port`. Port 0 picks a free port (see [`Self::local_addr`]).
    pub async fn bind(host: &str, port: u16, path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(Error::Config(format!(
                "callback path must start with '/', got '{}'",
                path
            )));
        }

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(Error::Listener)?;

        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::Listener)
    }

    /// Serves until a request with `expected_state` arrives or `timeout` elapses.
    ///
    /// The socket is closed before returning on every path, and also when the
    /// returned future is dropped early.
    pub async fn wait(self, expected_state: &str, timeout: Duration) -> Result<AuthorizationResult> {
        let Self { listener, path } = self;
        let addr = listener.local_addr().map_err(Error::Listener)?;

        let (tx, rx) = oneshot::channel();
        let router = callback_router(
            &path,
            CallbackState {
                expected_state: Arc::from(expected_state),
                sender: Arc::new(Mutex::new(Some(tx))),
            },
        );

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });
        let guard = shutdown.drop_guard();

        info!(address = %addr, path = %path, "Waiting for authorization callback");

        let outcome = tokio::time::timeout(timeout, rx).await;

        drop(guard);
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Ok(()))) => debug!(address = %addr, "Callback listener stopped"),
            Ok(Ok(Err(e))) => warn!(error = %e, "Callback listener exited with error"),
            Ok(Err(e)) => warn!(error = %e, "Callback listener task failed"),
            Err(_) => {
                warn!("Callback listener did not stop in time; aborting");
                server.abort();
            }
        }

        match outcome {
            Ok(Ok(result)) => {
                info!("Authorization callback received");
                Ok(result)
            }
            Ok(Err(_)) => Err(Error::Listener(std::io::Error::new(
                std::io::ErrorKind::Other,
                "callback server stopped unexpectedly",
            ))),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

/// Binds `host:port` and waits for one valid callback.
pub async fn await_callback(
    host: &str,
    port: u16,
    path: &str,
    expected_state: &str,
    timeout: Duration,
) -> Result<AuthorizationResult> {
    CallbackListener::bind(host, port, path)
        .await?
        .wait(expected_state, timeout)
        .await
}
