//! Server configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the competition service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Buffered snapshots per competition before slow observers lag
    pub broadcast_capacity: usize,
    /// Seconds to wait for open connections on shutdown
    pub shutdown_timeout_secs: u64,
    /// JSON fixture to seed the repository with
    pub fixture: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TOPOUT_HOST` | `0.0.0.0` |
    /// | `TOPOUT_PORT` | 8080 |
    /// | `TOPOUT_LOG_LEVEL` | `info` |
    /// | `TOPOUT_BROADCAST_CAPACITY` | 64 |
    /// | `TOPOUT_SHUTDOWN_TIMEOUT` | 10 |
    /// | `TOPOUT_FIXTURE` | unset |
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
        Self {
            host: lookup("TOPOUT_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("TOPOUT_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            log_level: lookup("TOPOUT_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            broadcast_capacity: lookup("TOPOUT_BROADCAST_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(64),
            shutdown_timeout_secs: lookup("TOPOUT_SHUTDOWN_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            fixture: lookup("TOPOUT_FIXTURE")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Address to listen on
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Grace period for open connections on shutdown
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
