use thiserror::Error;

/// Common error type for UpSight components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read secret file '{path}': {source}")]
    Secret {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key expression: {0}")]
    KeyExpr(String),
}

/// Result type alias using UpSight's Error.
pub type Result<T> = std::result::Result<T, Error>;
