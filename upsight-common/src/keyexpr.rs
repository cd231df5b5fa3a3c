use crate::error::{Error, Result};

/// Default key expression prefix for UPS telemetry.
pub const DEFAULT_KEY_PREFIX: &str = "v1/ups";

/// Characters with a special meaning in Zenoh key expressions.
const RESERVED: [char; 4] = ['*', '$', '?', '#'];

/// Builder for constructing UpSight key expressions.
///
/// Key expressions follow the pattern:
/// `<prefix>/<device>/<variable>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl KeyExprBuilder {
    /// Create a builder with the default prefix.
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Create a builder with a custom prefix.
    ///
    /// A trailing `/` is ignored, so `"v1/ups/"` and `"v1/ups"` are equivalent.
    pub fn with_prefix(prefix: impl AsRef<str>) -> Result<Self> {
        let prefix = prefix.as_ref().trim_end_matches('/');
        validate_prefix(prefix)?;
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    /// The prefix used by this builder.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build a key expression for a device variable.
    ///
    /// # Example
    /// ```
    /// use upsight_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::new();
    /// assert_eq!(builder.build("ups01", "battery.charge"), "v1/ups/ups01/battery.charge");
    /// ```
    pub fn build(&self, device: &str, variable: &str) -> String {
        self.qualify(&metric_topic(device, variable))
    }

    /// Prepend the prefix to a relative topic.
    ///
    /// # Example
    /// ```
    /// use upsight_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::with_prefix("site/a/").unwrap();
    /// assert_eq!(builder.qualify("ups01/ups.load"), "site/a/ups01/ups.load");
    /// ```
    pub fn qualify(&self, topic: &str) -> String {
        if topic.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, topic)
        }
    }
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Topic of a device variable, relative to the bridge prefix.
pub fn metric_topic(device: &str, variable: &str) -> String {
    format!("{}/{}", device, variable)
}

/// Whether `chunk` can be used as a single key expression chunk.
pub fn is_valid_chunk(chunk: &str) -> bool {
    !chunk.is_empty() && !chunk.contains('/') && !chunk.contains(RESERVED)
}

/// Validate a key expression prefix.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(Error::KeyExpr("prefix cannot be empty".to_string()));
    }

    match prefix.split('/').find(|chunk| !is_valid_chunk(chunk)) {
        Some(chunk) => Err(Error::KeyExpr(format!(
            "invalid chunk '{}' in prefix '{}'",
            chunk, prefix
        ))),
        None => Ok(()),
    }
}
