//! Engine configuration.
//!
//! Values come from serde defaults, then the process environment
//! (`QHSE_*` variables), then whatever the host overrides explicitly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Environment variable holding the API base URL.
pub const ENV_API_URL: &str = "QHSE_API_URL";
/// Environment variable holding the polling interval in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "QHSE_POLL_INTERVAL_MS";
/// Environment variable forcing the mock snapshot.
pub const ENV_USE_MOCK: &str = "QHSE_USE_MOCK";
/// Environment variable holding the HTTP request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "QHSE_REQUEST_TIMEOUT_SECS";
/// Environment variable pointing at the local storage file.
pub const ENV_TOKEN_FILE: &str = "QHSE_TOKEN_FILE";

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Configuration for the notification engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the QHSE REST API.
    pub api_base_url: String,
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Skip the network entirely and evaluate against the mock snapshot.
    pub use_mock_data: bool,
    /// HTTP request timeout in seconds (0 disables the timeout).
    pub request_timeout_secs: u64,
    /// Local storage file holding the bearer token.
    pub token_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            use_mock_data: false,
            request_timeout_secs: 10,
            token_file: None,
        }
    }
}

impl EngineConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup(ENV_API_URL)) {
            config.api_base_url = url;
        }
        if let Some(raw) = non_empty(lookup(ENV_POLL_INTERVAL_MS)) {
            config.poll_interval_ms = parse_u64(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = non_empty(lookup(ENV_USE_MOCK)) {
            config.use_mock_data = parse_bool(ENV_USE_MOCK, &raw)?;
        }
        if let Some(raw) = non_empty(lookup(ENV_REQUEST_TIMEOUT_SECS)) {
            config.request_timeout_secs = parse_u64(ENV_REQUEST_TIMEOUT_SECS, &raw)?;
        }
        if let Some(path) = non_empty(lookup(ENV_TOKEN_FILE)) {
            config.token_file = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll_interval_ms must be greater than zero"));
        }
        self.base_url()?;
        Ok(())
    }

    /// Parsed API base URL.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "api_base_url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|e| Error::config(format!("{key}: invalid number '{raw}': {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("{key}: invalid boolean '{raw}'"))),
    }
}
