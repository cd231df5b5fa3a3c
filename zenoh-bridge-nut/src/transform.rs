//! Normalization of NUT variables into published text.

use crate::telemetry::Value;

pub const UPS_STATUS: &str = "ups.status";
pub const BATTERY_RUNTIME: &str = "battery.runtime";

/// Display string for a `ups.status` code. Unknown codes map to `""`.
pub fn status_description(code: &str) -> &'static str {
    match code {
        "OL" => "Online",
        "OB" => "On Battery",
        "LB" => "Low Battery",
        "HB" => "High Battery",
        "RB" => "Battery Needs Replaced",
        "CHRG" => "Battery Charging",
        "DISCHRG" => "Battery Discharging",
        "BYPASS" => "Bypass Active",
        "CAL" => "Runtime Calibration",
        "OFF" => "Offline",
        "OVER" => "Overloaded",
        "TRIM" => "Trimming Voltage",
        "BOOST" => "Boosting Voltage",
        "FSD" => "Forced Shutdown",
        _ => "",
    }
}

/// Format a value by kind: integers as decimal, text as-is, floats with one decimal.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => format!("{:.1}", f),
        Value::Text(s) => s.clone(),
    }
}

/// Transform a variable into its published message.
///
/// Returns `None` when a variable with a dedicated rule carries a value of
/// the wrong kind; such variables are not published.
pub fn transform(name: &str, value: &Value) -> Option<String> {
    match (name, value) {
        (UPS_STATUS, Value::Text(code)) => Some(status_description(code).to_string()),
        (UPS_STATUS, _) => None,
        // Seconds to whole minutes.
        (BATTERY_RUNTIME, Value::Integer(secs)) => Some((secs / 60).to_string()),
        (BATTERY_RUNTIME, _) => None,
        (_, value) => Some(format_value(value)),
    }
}
