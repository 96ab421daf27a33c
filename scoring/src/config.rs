//! Client configuration.
//!
//! Loaded from environment variables with defaults suitable for a service
//! running on the same machine.

use crate::api::HttpCompetitionApi;
use crate::error::ApiError;
use crate::live::WsResultTransport;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use topout_runtime::retry::RetryPolicy;

/// Settings for the HTTP client and the live result channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the competition service
    pub api_url: String,
    /// Base URL of the live result feed
    pub ws_url: String,
    /// Consecutive reconnects before the live channel gives up
    pub live_max_attempts: usize,
    /// First reconnect delay in milliseconds, doubled per attempt
    pub live_base_interval_ms: u64,
    /// Reconnect delay cap in milliseconds
    pub live_max_interval_ms: u64,
    /// HTTP request timeout in seconds
    pub http_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TOPOUT_API_URL` | `http://localhost:8080` |
    /// | `TOPOUT_WS_URL` | `ws://localhost:8080` |
    /// | `TOPOUT_LIVE_MAX_ATTEMPTS` | 5 |
    /// | `TOPOUT_LIVE_BASE_INTERVAL_MS` | 500 |
    /// | `TOPOUT_LIVE_MAX_INTERVAL_MS` | 30000 |
    /// | `TOPOUT_HTTP_TIMEOUT_SECS` | 10 |
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Self {
            api_url: lookup("TOPOUT_API_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            ws_url: lookup("TOPOUT_WS_URL").unwrap_or_else(|| "ws://localhost:8080".to_string()),
            live_max_attempts: lookup("TOPOUT_LIVE_MAX_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            live_base_interval_ms: number("TOPOUT_LIVE_BASE_INTERVAL_MS", 500),
            live_max_interval_ms: number("TOPOUT_LIVE_MAX_INTERVAL_MS", 30_000),
            http_timeout_secs: number("TOPOUT_HTTP_TIMEOUT_SECS", 10),
        }
    }

    /// Backoff policy for the live result channel
    #[must_use]
    pub fn live_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.live_max_attempts)
            .initial_delay(Duration::from_millis(self.live_base_interval_ms))
            .max_delay(Duration::from_millis(self.live_max_interval_ms))
            .multiplier(2.0)
            .jitter(true)
            .build()
    }

    /// HTTP request timeout
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Competition service client for these settings
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn http_api(&self) -> Result<HttpCompetitionApi, ApiError> {
        HttpCompetitionApi::new(self.api_url.clone(), self.http_timeout())
    }

    /// Live result transport for these settings
    #[must_use]
    pub fn live_transport(&self) -> WsResultTransport {
        WsResultTransport::new(self.ws_url.clone())
    }
}
