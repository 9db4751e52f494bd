//! Client configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::realtime::{Backoff, RetryPolicy};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_STEP_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base URL, without a trailing slash. Endpoints are appended verbatim.
    pub api_base_url: String,
    /// Realtime socket URL; the token is appended as a query parameter.
    pub ws_url: String,
    /// Where the session token is persisted. `None` keeps it in memory.
    pub token_file: Option<PathBuf>,
    pub timeouts: HttpTimeouts,
    pub reconnect: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            token_file: None,
            timeouts: HttpTimeouts::default(),
            reconnect: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// All optional:
    /// - `SOCIAL_API_BASE_URL`: default `http://localhost:8000/api`
    /// - `SOCIAL_WS_URL`: default `ws://localhost:8000/ws`
    /// - `SOCIAL_TOKEN_FILE`: token persistence path; in-memory when absent
    /// - `SOCIAL_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SOCIAL_CONNECT_TIMEOUT_SECS`: default 10
    /// - `SOCIAL_RECONNECT_MAX_ATTEMPTS`: default 5
    /// - `SOCIAL_RECONNECT_STEP_MS`: linear backoff step, default 3000
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_base_url = trim_url(non_empty("SOCIAL_API_BASE_URL").as_deref().unwrap_or(DEFAULT_API_BASE_URL));
        let ws_url = trim_url(non_empty("SOCIAL_WS_URL").as_deref().unwrap_or(DEFAULT_WS_URL));
        let token_file = non_empty("SOCIAL_TOKEN_FILE").map(PathBuf::from);
        let timeouts = HttpTimeouts {
            request_secs: parse_or(non_empty("SOCIAL_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(non_empty("SOCIAL_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let reconnect = RetryPolicy {
            max_attempts: parse_or(non_empty("SOCIAL_RECONNECT_MAX_ATTEMPTS"), DEFAULT_RECONNECT_MAX_ATTEMPTS),
            backoff: Backoff::Linear {
                step: Duration::from_millis(parse_or(non_empty("SOCIAL_RECONNECT_STEP_MS"), DEFAULT_RECONNECT_STEP_MS)),
            },
        };

        Self { api_base_url, ws_url, token_file, timeouts, reconnect }
    }
}

fn trim_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
