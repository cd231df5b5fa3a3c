//! Configuration for the NUT bridge.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use upsight_common::config::{LoggingConfig, ZenohConfig};
use upsight_common::keyexpr::{DEFAULT_KEY_PREFIX, validate_prefix};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Missing credential: {0}")]
    Credentials(String),
    #[error(transparent)]
    Common(#[from] upsight_common::Error),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// NUT server settings
    pub nut: NutConfig,

    /// Cycle timing and topic settings
    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the NUT server (upsd).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutConfig {
    /// Host where upsd is running
    #[serde(default = "default_host")]
    pub host: String,

    /// upsd TCP port
    #[serde(default = "default_nut_port")]
    pub port: u16,

    /// User name for upsd authentication (required)
    #[serde(default)]
    pub username: Option<String>,

    /// Password for upsd authentication (required unless `password_file` is set)
    #[serde(default)]
    pub password: Option<String>,

    /// File holding the upsd password
    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// Timeout for each protocol read/write in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_nut_port() -> u16 {
    3493
}

fn default_timeout_ms() -> u64 {
    5000
}

impl NutConfig {
    /// `host:port` of the upsd server.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NutConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_nut_port(),
            username: None,
            password: None,
            password_file: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Cycle timing and topic settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Key expression prefix (default: "v1/ups")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Pause after a completed publish cycle
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Connectivity re-check interval
    #[serde(default = "default_idle_interval")]
    pub idle_interval_secs: u64,

    /// Maximum wait for a publish to be acknowledged
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,

    /// Maximum duration of a single broker connection attempt
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Pause between broker connection attempts
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Interval between broker liveness probes
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_poll_interval() -> u64 {
    12
}

fn default_idle_interval() -> u64 {
    3
}

fn default_publish_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_liveness_interval() -> u64 {
    1
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            poll_interval_secs: default_poll_interval(),
            idle_interval_secs: default_idle_interval(),
            publish_timeout_secs: default_publish_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            retry_backoff_secs: default_retry_backoff(),
            liveness_interval_secs: default_liveness_interval(),
        }
    }
}

impl NutBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: NutBridgeConfig = upsight_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Credentials are checked separately when the NUT session is initialized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nut.host.is_empty() {
            return Err(ConfigError::Validation(
                "nut.host cannot be empty".to_string(),
            ));
        }

        if self.nut.port == 0 {
            return Err(ConfigError::Validation("nut.port must be 1-65535".to_string()));
        }

        if self.nut.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "nut.timeout_ms must be greater than 0".to_string(),
            ));
        }

        let intervals = [
            ("poll_interval_secs", self.bridge.poll_interval_secs),
            ("idle_interval_secs", self.bridge.idle_interval_secs),
            ("publish_timeout_secs", self.bridge.publish_timeout_secs),
            ("connect_timeout_secs", self.bridge.connect_timeout_secs),
            ("retry_backoff_secs", self.bridge.retry_backoff_secs),
            ("liveness_interval_secs", self.bridge.liveness_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Validation(format!(
                "bridge.{} must be greater than 0",
                name
            )));
        }

        validate_prefix(self.bridge.key_prefix.trim_end_matches('/'))?;

        Ok(())
    }
}
