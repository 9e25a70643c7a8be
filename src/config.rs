//! Client configuration.
//!
//! Values come from `PANEL_*` environment variables with sensible defaults, or from
//! any serde source (every field has a default).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://localhost:7009/api/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every relative request path is joined to. Always ends with `/`.
    pub api_base_url: String,
    /// Per-request timeout; firing counts as a network failure.
    #[serde(with = "millis")]
    pub timeout: Duration,
    pub retry_attempts: u32,
    #[serde(with = "millis")]
    pub retry_base_delay: Duration,
    pub cache_ttl_minutes: f64,
    /// File for the durable store; `None` keeps state in memory only.
    pub storage_path: Option<PathBuf>,
    /// Keep a cookie jar so the http-only refresh cookie round-trips.
    pub cookie_store: bool,
    pub development: bool,
    pub refresh_path: String,
    pub logout_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(10_000),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(1_500),
            cache_ttl_minutes: 5.0,
            storage_path: None,
            cookie_store: true,
            development: false,
            refresh_path: "Auth/refresh-token".to_string(),
            logout_path: "Auth/logout".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "panel_client::config", "ignoring invalid {}='{}'", key, raw);
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl ClientConfig {
    /// Defaults overridden by any `PANEL_*` variables that are set and valid.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("PANEL_API_BASE_URL") {
            if !url.trim().is_empty() { cfg.api_base_url = url.trim().to_string(); }
        }
        if let Some(ms) = env_parse::<u64>("PANEL_API_TIMEOUT_MS") { cfg.timeout = Duration::from_millis(ms); }
        if let Some(n) = env_parse::<u32>("PANEL_RETRY_ATTEMPTS") { cfg.retry_attempts = n; }
        if let Some(ms) = env_parse::<u64>("PANEL_RETRY_BASE_DELAY_MS") { cfg.retry_base_delay = Duration::from_millis(ms); }
        if let Some(m) = env_parse::<f64>("PANEL_CACHE_TTL_MINUTES") { cfg.cache_ttl_minutes = m; }
        if let Ok(p) = std::env::var("PANEL_STORAGE_PATH") {
            if !p.trim().is_empty() { cfg.storage_path = Some(PathBuf::from(p.trim())); }
        }
        if let Some(b) = env_flag("PANEL_COOKIES") { cfg.cookie_store = b; }
        if let Ok(env) = std::env::var("PANEL_ENV") {
            cfg.development = env.trim().eq_ignore_ascii_case("development");
        }
        cfg.normalized()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self.normalized()
    }

    /// Ensure the base URL ends with `/` so relative joins keep its path.
    pub fn normalized(mut self) -> Self {
        if !self.api_base_url.ends_with('/') {
            warn!(target: "panel_client::config", "API base URL '{}' should end with '/'; appending", self.api_base_url);
            self.api_base_url.push('/');
        }
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
