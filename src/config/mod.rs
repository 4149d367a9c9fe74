pub mod paths;
pub use paths::AppPaths;

use crate::error::Error;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://anyrouter.top";
pub const DEFAULT_CALLBACK_HOST: &str = "127.0.0.1";
pub const DEFAULT_CALLBACK_PORT: u16 = 8765;
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";
pub const DEFAULT_SCHEDULE_HOUR: u32 = 9;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub http: HttpTimeouts,
}

/// OAuth settings for the provider's GitHub-backed login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// OAuth client id (required for authorize, used by refresh)
    pub client_id: Option<String>,
    /// Provider origin, e.g. "https://anyrouter.top"
    pub base_url: String,
    pub redirect_host: String,
    pub redirect_port: u16,
    pub callback_path: String,
    pub scope: String,
    /// How long `authorize` waits for the redirect
    pub callback_timeout_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            redirect_host: DEFAULT_CALLBACK_HOST.to_string(),
            redirect_port: DEFAULT_CALLBACK_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            scope: "read:user".to_string(),
            callback_timeout_secs: 300,
        }
    }
}

impl OAuthConfig {
    /// Redirect URI registered with the provider; must match the listener.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.redirect_host, self.redirect_port, self.callback_path
        )
    }

    pub fn authorize_endpoint(&self) -> String {
        self.endpoint("/api/oauth/authorize")
    }

    pub fn token_endpoint(&self) -> String {
        self.endpoint("/api/oauth/token")
    }

    pub fn checkin_endpoint(&self) -> String {
        self.endpoint("/api/checkin")
    }

    pub fn session_endpoint(&self) -> String {
        self.endpoint("/api/session")
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    /// Returns the client id or a configuration error naming the env var.
    pub fn require_client_id(&self) -> Result<&str, Error> {
        match self.client_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(Error::Config(
                "ANYROUTER_CLIENT_ID missing. Provide via --client-id, config.toml or environment"
                    .to_string(),
            )),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Daily fire time (local wall clock)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_schedule_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

fn default_schedule_hour() -> u32 {
    DEFAULT_SCHEDULE_HOUR
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: default_schedule_hour(),
            minute: 0,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.hour > 23 {
            return Err(Error::Config(format!(
                "schedule hour must be 0-23, got {}",
                self.hour
            )));
        }
        if self.minute > 59 {
            return Err(Error::Config(format!(
                "schedule minute must be 0-59, got {}",
                self.minute
            )));
        }
        Ok(())
    }
}

/// Per-call network timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTimeouts {
    #[serde(default = "default_session_timeout")]
    pub session_secs: u64,
    #[serde(default = "default_checkin_timeout")]
    pub checkin_secs: u64,
    #[serde(default = "default_token_timeout")]
    pub token_secs: u64,
}

fn default_session_timeout() -> u64 {
    10
}

fn default_checkin_timeout() -> u64 {
    15
}

fn default_token_timeout() -> u64 {
    30
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            session_secs: default_session_timeout(),
            checkin_secs: default_checkin_timeout(),
            token_secs: default_token_timeout(),
        }
    }
}

impl HttpTimeouts {
    pub fn session(&self) -> Duration {
        Duration::from_secs(self.session_secs)
    }

    pub fn checkin(&self) -> Duration {
        Duration::from_secs(self.checkin_secs)
    }

    pub fn token(&self) -> Duration {
        Duration::from_secs(self.token_secs)
    }
}

impl AppConfig {
    /// Load `config.toml` under `paths` if present, then apply environment overrides.
    pub fn load(paths: &AppPaths) -> Result<Self, Error> {
        let path = paths.config_file();
        let mut config = if path.exists() {
            load_config(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `ANYROUTER_*` overrides from `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("ANYROUTER_CLIENT_ID").filter(|v| !v.trim().is_empty()) {
            self.oauth.client_id = Some(id);
        }
        if let Some(url) = lookup("ANYROUTER_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.oauth.base_url = url;
        }
        if let Some(v) = lookup("ANYROUTER_SCHEDULE_HOUR") {
            self.schedule.hour = parse_number("ANYROUTER_SCHEDULE_HOUR", &v)?;
        }
        if let Some(v) = lookup("ANYROUTER_SCHEDULE_MINUTE") {
            self.schedule.minute = parse_number("ANYROUTER_SCHEDULE_MINUTE", &v)?;
        }
        self.schedule.validate()
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32, Error> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<AppConfig, Error> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))?;
    Ok(config)
}
