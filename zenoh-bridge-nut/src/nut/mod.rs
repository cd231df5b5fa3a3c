//! Network UPS Tools (upsd) telemetry source.

pub mod client;
pub mod protocol;
pub mod session;

use std::time::Duration;

pub use client::{MAX_LINE_LEN, NutClient, UpsDevice};
pub use session::{NutCredentials, NutSession, TelemetrySource, extract_metrics};

/// Errors from the upsd connection.
///
/// All of them leave the session in an unknown state; callers must not keep
/// using a session that returned one.
#[derive(Debug, thiserror::Error)]
pub enum NutError {
    #[error("Cannot connect to NUT host {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No reply from NUT host within {0:?}")]
    Timeout(Duration),
    #[error("NUT host rejected '{command}': {code}")]
    Server { command: String, code: String },
    #[error("Unexpected reply to '{command}': {reply}")]
    Protocol { command: String, reply: String },
    #[error("Reply line from NUT host exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("Connection closed by NUT host")]
    Closed,
}
