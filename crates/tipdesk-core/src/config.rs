//! Application configuration management.
//!
//! Two layers live here:
//!
//! - `ApiConfig`: request pipeline settings fixed at build time (base URL,
//!   timeout, retry policy). There is no runtime override of the base URL.
//! - `Config`: user preferences persisted at `~/.config/tipdesk/config.json`
//!   (last used email, which token storage backend to use).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "tipdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend address used by debug builds
const DEV_BASE_URL: &str = "http://localhost:5000/api";

/// Backend address used by release builds
const PROD_BASE_URL: &str = "https://api.tipdesk.app/api";

/// HTTP request timeout in seconds, measured client-side.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout retries per logical request.
const MAX_TIMEOUT_RETRIES: u32 = 1;

/// Delay before the first timeout retry; doubles for each further retry.
const RETRY_BACKOFF_MS: u64 = 1000;

/// Path of the login screen the pipeline redirects to on 401.
pub const LOGIN_PATH: &str = "/login";

/// How many times, and how patiently, a timed-out request is reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_timeout_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Retry nothing. Useful for callers that do their own recovery.
    pub fn none() -> Self {
        Self {
            max_timeout_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_timeout_retries: MAX_TIMEOUT_RETRIES,
            backoff: Duration::from_millis(RETRY_BACKOFF_MS),
        }
    }
}

/// Request pipeline configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub login_path: String,
}

impl ApiConfig {
    /// Configuration for the current build mode.
    pub fn resolve() -> Self {
        let base_url = if cfg!(debug_assertions) {
            DEV_BASE_URL
        } else {
            PROD_BASE_URL
        };
        Self::with_base_url(base_url)
    }

    /// Default policy against an explicit backend address.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            login_path: LOGIN_PATH.to_string(),
        }
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Join a request path onto the base URL.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::resolve()
    }
}

/// Where the bearer token is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorageKind {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub last_email: Option<String>,
    #[serde(default)]
    pub token_storage: TokenStorageKind,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding durable session state.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
