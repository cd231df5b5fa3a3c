//! Telemetry data model: variables read from upsd and metrics sent to Zenoh.

use std::collections::BTreeMap;
use std::fmt;

/// Variables tracked by default, with a short description of each.
pub const TRACKED_VARIABLES: &[(&str, &str)] = &[
    ("battery.charge", "Battery charge (percent of full)"),
    ("battery.runtime", "Battery runtime (seconds)"),
    ("battery.voltage", "Battery voltage (V)"),
    ("input.voltage", "Input voltage (V)"),
    ("ups.load", "Load on UPS (percent of full)"),
    ("ups.status", "UPS status"),
];

/// Typed value of a NUT variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Decode a raw upsd value.
    ///
    /// Integers win over floats; anything that is not a finite number is text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Integer(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Float(f),
            _ => Value::Text(raw.to_string()),
        }
    }

    /// Name of the value kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// A named variable reported by a UPS.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A message ready to be published.
///
/// Collected metrics carry a `<device>/<variable>` topic relative to the
/// bridge key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub topic: String,
    pub message: String,
}

/// Set of variable names eligible for publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    entries: BTreeMap<String, String>,
}

impl Whitelist {
    /// Build a whitelist from (name, description) pairs.
    pub fn from_pairs<I, N, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(name, description)| (name.into(), description.into()))
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::from_pairs(TRACKED_VARIABLES.iter().copied())
    }
}
