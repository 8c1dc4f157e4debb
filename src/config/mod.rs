//! Client options.
//!
//! Mirrors the knobs of the wrapped library's session constructor (connection
//! string, timeouts, resumption credentials) plus the client-level operating
//! timeout and base path. Options can be built in code or loaded from a TOML
//! file with an environment-variable overlay.

use std::time::Duration;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

/// Configuration for a [`ZkClient`](crate::ZkClient).
///
/// The millisecond fields default to the conventional 10s connection / 20s
/// session / 60s operating timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientOptions {
    /// Ensemble address list, e.g. `"10.0.0.1:2181,10.0.0.2:2181"`
    pub connection_string: String,

    /// Maximum time to wait for the reconnect lock when rebuilding an
    /// expired session
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Session timeout negotiated with the service
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Total wall-clock budget for one retried operation
    #[serde(default = "default_operating_timeout_ms")]
    pub operating_timeout_ms: u64,

    /// Accept a read-only session when the ensemble has lost quorum
    #[serde(default)]
    pub read_only: bool,

    /// Session id to resume (0 means a fresh session)
    #[serde(default)]
    pub session_id: i64,

    /// Password paired with `session_id`
    #[serde(default)]
    pub session_password: Option<Vec<u8>>,

    /// Prefix transparently applied to every logical path
    #[serde(default)]
    pub base_path: Option<String>,
}

impl ClientOptions {
    /// Options for `connection_string` with default timeouts.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            connection_timeout_ms: default_connection_timeout_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            operating_timeout_ms: default_operating_timeout_ms(),
            read_only: false,
            session_id: 0,
            session_password: None,
            base_path: None,
        }
    }

    /// Load options from an optional TOML file, overlaid with `ZK`-prefixed
    /// environment variables (e.g. `ZK__CONNECTION_STRING`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("ZK")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Set the reconnect-lock timeout (default: 10s)
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the session timeout (default: 20s)
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-operation retry budget (default: 60s)
    pub fn with_operating_timeout(mut self, timeout: Duration) -> Self {
        self.operating_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Resume a previous session instead of negotiating a fresh one.
    pub fn with_session(mut self, id: i64, password: Vec<u8>) -> Self {
        self.session_id = id;
        self.session_password = Some(password);
        self
    }

    /// Prefix every logical path with `base_path`.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn operating_timeout(&self) -> Duration {
        Duration::from_millis(self.operating_timeout_ms)
    }
}

fn default_connection_timeout_ms() -> u64 {
    10_000
}
fn default_session_timeout_ms() -> u64 {
    20_000
}
fn default_operating_timeout_ms() -> u64 {
    60_000
}

#[cfg(test)]
mod config_test;
