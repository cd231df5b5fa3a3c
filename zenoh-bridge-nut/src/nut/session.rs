//! Authenticated upsd session and per-cycle metric collection.

use std::fmt;
use std::future::Future;

use tracing::{debug, error, info, warn};
use upsight_common::keyexpr::{is_valid_chunk, metric_topic};
use upsight_common::resolve_password;

use super::{NutClient, NutError};
use crate::config::{ConfigError, NutConfig};
use crate::telemetry::{Metric, Variable, Whitelist};
use crate::transform::transform;

/// Credentials for upsd, resolved once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct NutCredentials {
    pub username: String,
    password: String,
}

impl NutCredentials {
    /// Resolve the password (secret file first) and require both values.
    pub fn resolve(config: &NutConfig) -> Result<Self, ConfigError> {
        let password = resolve_password(config.password.as_deref(), config.password_file.as_deref())?;

        let username = config
            .username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                ConfigError::Credentials(format!(
                    "nut.username must be supplied to connect to {}",
                    config.host
                ))
            })?;

        let password = password.ok_or_else(|| {
            ConfigError::Credentials(format!(
                "nut.password must be supplied to connect to {}",
                config.host
            ))
        })?;

        Ok(Self { username, password })
    }
}

impl fmt::Debug for NutCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NutCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Something that produces metrics once per cycle.
pub trait TelemetrySource: Send {
    fn collect(
        &mut self,
        whitelist: &Whitelist,
    ) -> impl Future<Output = Result<Vec<Metric>, NutError>> + Send;
}

/// An authenticated upsd session.
pub struct NutSession {
    client: NutClient,
    addr: String,
}

impl NutSession {
    /// Connect to upsd and log in.
    pub async fn connect(config: &NutConfig, credentials: &NutCredentials) -> Result<Self, NutError> {
        let addr = config.address();

        let mut client = NutClient::connect(&addr, config.timeout())
            .await
            .inspect_err(|e| error!(hostname = %addr, error = %e, "Cannot connect to NUT host"))?;
        info!(hostname = %addr, "Connected to NUT host");

        client
            .authenticate(&credentials.username, &credentials.password)
            .await
            .inspect_err(|e| {
                error!(username = %credentials.username, error = %e, "Unable to authenticate")
            })?;
        debug!(username = %credentials.username, "Authenticated");

        Ok(Self { client, addr })
    }

    /// Read every whitelisted variable of every UPS and transform it.
    pub async fn collect(&mut self, whitelist: &Whitelist) -> Result<Vec<Metric>, NutError> {
        let devices = self
            .client
            .list_ups()
            .await
            .inspect_err(|e| error!(hostname = %self.addr, error = %e, "Unable to list UPS devices"))?;

        let mut metrics = Vec::new();
        for device in &devices {
            let variables = self.client.list_vars(&device.name).await.inspect_err(|e| {
                error!(hostname = %self.addr, ups = %device.name, error = %e, "Unable to read variables")
            })?;
            metrics.extend(extract_metrics(&device.name, &variables, whitelist));
        }

        debug!(
            devices = devices.len(),
            metrics = metrics.len(),
            "Collected NUT variables"
        );
        Ok(metrics)
    }

    /// Log out; errors are only reported.
    pub async fn logout(mut self) {
        if let Err(e) = self.client.logout().await {
            warn!(hostname = %self.addr, error = %e, "NUT logout failed");
        }
    }
}

impl TelemetrySource for NutSession {
    async fn collect(&mut self, whitelist: &Whitelist) -> Result<Vec<Metric>, NutError> {
        NutSession::collect(self, whitelist).await
    }
}

/// Build the metrics of one device from its variables.
///
/// Non-whitelisted variables are skipped, as are variables whose value has
/// the wrong kind for their transform.
pub fn extract_metrics(device: &str, variables: &[Variable], whitelist: &Whitelist) -> Vec<Metric> {
    if !is_valid_chunk(device) {
        warn!(ups = %device, "UPS name cannot be used in a key expression, skipping");
        return Vec::new();
    }

    variables
        .iter()
        .filter(|var| whitelist.contains(&var.name))
        .filter_map(|var| match transform(&var.name, &var.value) {
            Some(message) => {
                debug!(
                    description = whitelist.description(&var.name).unwrap_or_default(),
                    "{}/{} = {}",
                    device,
                    var.name,
                    message
                );
                Some(Metric {
                    topic: metric_topic(device, &var.name),
                    message,
                })
            }
            None => {
                warn!(
                    ups = %device,
                    variable = %var.name,
                    kind = var.value.kind(),
                    value = %var.value,
                    "Unexpected value kind, variable dropped"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Value;

    fn vars(pairs: &[(&str, &str)]) -> Vec<Variable> {
        pairs
            .iter()
            .map(|(name, raw)| Variable::new(*name, Value::parse(raw)))
            .collect()
    }

    #[test]
    fn test_extract_whitelisted_only() {
        let variables = vars(&[
            ("battery.charge", "100"),
            ("battery.runtime", "1830"),
            ("battery.voltage", "13.65"),
            ("device.serial", "AS1234"),
            ("input.voltage", "229.0"),
            ("ups.load", "17"),
            ("ups.status", "OL"),
            ("ups.beeper.status", "enabled"),
        ]);

        let metrics = extract_metrics("rack", &variables, &Whitelist::default());

        let expected = [
            ("rack/battery.charge", "100"),
            ("rack/battery.runtime", "30"),
            ("rack/battery.voltage", "13.7"),
            ("rack/input.voltage", "229.0"),
            ("rack/ups.load", "17"),
            ("rack/ups.status", "Online"),
        ];
        assert_eq!(metrics.len(), expected.len());
        for (metric, (topic, message)) in metrics.iter().zip(expected) {
            assert_eq!(metric.topic, topic);
            assert_eq!(metric.message, message);
        }
    }

    #[test]
    fn test_non_whitelisted_never_published() {
        let whitelist = Whitelist::from_pairs([("ups.load", "Load")]);
        let variables = vars(&[
            ("ups.status", "OL"),
            ("battery.charge", "90"),
            ("ups.load", "20"),
        ]);

        let metrics = extract_metrics("ups1", &variables, &whitelist);

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].topic, "ups1/ups.load");
        assert!(metrics.iter().all(|m| !m.topic.ends_with("ups.status")));
    }

    #[test]
    fn test_wrong_kind_dropped_unknown_status_kept() {
        let variables = vars(&[
            ("battery.runtime", "12.5"),
            ("ups.status", "OL CHRG"),
            ("ups.load", "3"),
        ]);

        let metrics = extract_metrics("ups1", &variables, &Whitelist::default());

        assert_eq!(
            metrics,
            vec![
                Metric {
                    topic: "ups1/ups.status".to_string(),
                    message: String::new(),
                },
                Metric {
                    topic: "ups1/ups.load".to_string(),
                    message: "3".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_invalid_device_name_skipped() {
        let variables = vars(&[("ups.load", "3")]);
        assert!(extract_metrics("bad*name", &variables, &Whitelist::default()).is_empty());
    }

    #[test]
    fn test_credentials_required() {
        let config = NutConfig {
            username: Some("monuser".to_string()),
            ..NutConfig::default()
        };
        assert!(matches!(
            NutCredentials::resolve(&config),
            Err(ConfigError::Credentials(_))
        ));

        let config = NutConfig {
            password: Some("secret".to_string()),
            ..NutConfig::default()
        };
        assert!(matches!(
            NutCredentials::resolve(&config),
            Err(ConfigError::Credentials(_))
        ));

        let config = NutConfig {
            username: Some(String::new()),
            password: Some("secret".to_string()),
            ..NutConfig::default()
        };
        assert!(NutCredentials::resolve(&config).is_err());
    }

    #[test]
    fn test_credentials_from_secret_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "filepass").unwrap();

        let config = NutConfig {
            username: Some("monuser".to_string()),
            password_file: Some(file.path().to_path_buf()),
            ..NutConfig::default()
        };
        let credentials = NutCredentials::resolve(&config).unwrap();

        assert_eq!(credentials.username, "monuser");
        assert_eq!(credentials.password, "filepass");
        assert!(!format!("{:?}", credentials).contains("filepass"));
    }
}
