//! Zenoh bridge for Network UPS Tools (NUT).
//!
//! This bridge logs into an upsd server, reads a fixed set of UPS variables
//! and publishes them to Zenoh. Collection only happens while the Zenoh
//! session is up; the session is re-established in the background when lost.
//!
//! # Key Expressions
//!
//! ```text
//! v1/ups/<device>/<variable>
//! ```
//!
//! Where:
//! - `<device>` - UPS name as reported by `LIST UPS`
//! - `<variable>` - NUT variable name, e.g. `battery.charge`
//!
//! Payloads are bare UTF-8 text. `ups.status` is published as a description
//! (`OL` becomes `Online`) and `battery.runtime` in whole minutes.

pub mod config;
pub mod driver;
pub mod nut;
pub mod sink;
pub mod telemetry;
pub mod transform;
