//! Plugin configuration (`pgprobe.toml`).
//!
//! ```toml
//! timeout = 5
//! keep_alive = 300
//! custom_queries_enabled = true
//! custom_queries_path = "/etc/pgprobe/queries"
//!
//! [default]
//! user = "zbx_monitor"
//!
//! [sessions.replica]
//! uri = "tcp://replica.db.local:5432"
//! user = "zbx_monitor"
//! password = "secret"
//! tls_connect = "verify_full"
//! tls_ca_file = "/etc/pgprobe/ca.pem"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pgprobe_conn::{MIN_SUPPORTED_VERSION, RegistryConfig};
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Timeout used for unset `timeout`/`call_timeout`, in seconds.
pub const DEFAULT_GLOBAL_TIMEOUT: u64 = 3;

const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=30;
const KEEP_ALIVE_RANGE: std::ops::RangeInclusive<u64> = 60..=900;

/// A named set of connection settings.
///
/// Empty fields fall through to the `default` session and then to the
/// built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Session {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls_connect: String,
    pub tls_ca_file: String,
    pub tls_cert_file: String,
    pub tls_key_file: String,
    pub cache_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginOptions {
    /// Connect timeout in seconds (1..=30). Unset means the global timeout.
    pub timeout: Option<u64>,
    /// Query timeout in seconds (1..=30). Unset means the global timeout.
    pub call_timeout: Option<u64>,
    /// Seconds an unused connection is kept open (60..=900).
    pub keep_alive: u64,
    /// Seconds between housekeeper sweeps.
    pub housekeeper_interval: u64,
    /// Directory of `*.sql` files for `pgsql.custom.query`.
    pub custom_queries_path: Option<PathBuf>,
    pub custom_queries_enabled: bool,
    pub sessions: HashMap<String, Session>,
    pub default: Session,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            call_timeout: None,
            keep_alive: 300,
            housekeeper_interval: 10,
            custom_queries_path: None,
            custom_queries_enabled: false,
            sessions: HashMap::new(),
            default: Session::default(),
        }
    }
}

impl PluginOptions {
    pub fn from_toml_str(content: &str) -> PluginResult<Self> {
        toml::from_str(content).map_err(|e| PluginError::config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> PluginResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PluginError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Fill unset timeouts from the agent-wide timeout.
    pub fn with_global_timeout(mut self, seconds: u64) -> Self {
        self.timeout.get_or_insert(seconds);
        self.call_timeout.get_or_insert(seconds);
        self
    }

    pub fn validate(&self) -> PluginResult<()> {
        for (name, value) in [("timeout", self.timeout), ("call_timeout", self.call_timeout)] {
            if let Some(v) = value {
                if !TIMEOUT_RANGE.contains(&v) {
                    return Err(PluginError::config(format!(
                        "{name} = {v} is out of range {}..={}",
                        TIMEOUT_RANGE.start(),
                        TIMEOUT_RANGE.end()
                    )));
                }
            }
        }

        if !KEEP_ALIVE_RANGE.contains(&self.keep_alive) {
            return Err(PluginError::config(format!(
                "keep_alive = {} is out of range {}..={}",
                self.keep_alive,
                KEEP_ALIVE_RANGE.start(),
                KEEP_ALIVE_RANGE.end()
            )));
        }

        if self.housekeeper_interval == 0 || self.housekeeper_interval > self.keep_alive {
            return Err(PluginError::config(format!(
                "housekeeper_interval = {} must be between 1 and keep_alive ({})",
                self.housekeeper_interval, self.keep_alive
            )));
        }

        if self.custom_queries_enabled {
            if let Some(path) = &self.custom_queries_path {
                if !path.is_absolute() {
                    return Err(PluginError::config(format!(
                        "custom_queries_path {:?} must be absolute",
                        path.display().to_string()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_GLOBAL_TIMEOUT))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout.unwrap_or(DEFAULT_GLOBAL_TIMEOUT))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            keep_alive: Duration::from_secs(self.keep_alive),
            connect_timeout: self.connect_timeout(),
            call_timeout: self.call_timeout(),
            housekeeper_interval: Duration::from_secs(self.housekeeper_interval),
            min_version: MIN_SUPPORTED_VERSION,
        }
    }
}
