use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ZenohConfig;
use crate::error::{Error, Result};
use crate::secret::resolve_password;

/// Build a process-stable session identifier: `<app>_<unix seconds>`.
pub fn default_client_id(app: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{}_{}", app, secs)
}

/// Compute the Zenoh configuration entries (`key`, JSON5 value) for a bridge.
///
/// Applies the credential and TLS policy:
/// - a username requires a password (inline or from `password_file`);
/// - TLS is enabled only when both certificate and private key are set,
///   a lone certificate or key is ignored with a warning.
pub fn config_entries(config: &ZenohConfig, client_id: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();

    let mode = match config.mode.as_str() {
        "client" | "peer" | "router" => json_string(&config.mode)?,
        other => {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };
    entries.push(("mode".to_string(), mode));

    if !config.connect.is_empty() {
        entries.push((
            "connect/endpoints".to_string(),
            serde_json::to_string(&config.connect)?,
        ));
    }

    if !config.listen.is_empty() {
        entries.push((
            "listen/endpoints".to_string(),
            serde_json::to_string(&config.listen)?,
        ));
    }

    entries.push((
        "metadata".to_string(),
        serde_json::json!({ "name": client_id }).to_string(),
    ));

    let password = resolve_password(config.password.as_deref(), config.password_file.as_deref())?;
    if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
        let password = password.ok_or_else(|| {
            Error::Config("Zenoh requires a password when a username is supplied".to_string())
        })?;
        entries.push((
            "transport/auth/usrpwd/user".to_string(),
            json_string(username)?,
        ));
        entries.push((
            "transport/auth/usrpwd/password".to_string(),
            json_string(&password)?,
        ));
    }

    match (&config.certificate, &config.private_key) {
        (Some(certificate), Some(private_key)) => {
            entries.push((
                "transport/link/tls/connect_certificate".to_string(),
                json_string(&certificate.display().to_string())?,
            ));
            entries.push((
                "transport/link/tls/connect_private_key".to_string(),
                json_string(&private_key.display().to_string())?,
            ));
            entries.push(("transport/link/tls/enable_mtls".to_string(), "true".to_string()));
            entries.push((
                "transport/link/tls/verify_name_on_connect".to_string(),
                "false".to_string(),
            ));

            let secure = config
                .connect
                .iter()
                .any(|e| e.starts_with("tls/") || e.starts_with("quic/"));
            if !secure {
                tracing::warn!(
                    connect = ?config.connect,
                    "To use TLS the connect endpoints have to begin with 'tls/' or 'quic/'"
                );
            }
        }
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("For TLS both certificate and private key are needed. Skipping TLS.");
        }
        (None, None) => {}
    }

    Ok(entries)
}

/// Build a `zenoh::Config` from the bridge configuration.
pub fn build_config(config: &ZenohConfig, client_id: &str) -> Result<zenoh::Config> {
    let mut zenoh_config = zenoh::Config::default();

    for (key, value) in config_entries(config, client_id)? {
        zenoh_config
            .insert_json5(&key, &value)
            .map_err(|e| Error::Config(format!("Failed to set {}: {}", key, e)))?;
    }

    Ok(zenoh_config)
}

fn json_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
