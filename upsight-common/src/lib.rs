//! UpSight Common Library
//!
//! This crate provides shared utilities for UpSight bridges:
//!
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session configuration
//! - [`keyexpr`] - Key expression builders and validation
//! - [`secret`] - File-based secrets
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod keyexpr;
pub mod secret;
pub mod session;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ZenohConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use keyexpr::{DEFAULT_KEY_PREFIX, KeyExprBuilder, metric_topic};
pub use secret::{read_secret_file, resolve_password};
pub use session::{build_config, default_client_id};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two output
/// formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
