//! Zenoh bridge for Network UPS Tools (NUT).
//!
//! This bridge polls an upsd server and publishes UPS telemetry to Zenoh.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use upsight_common::LoggingConfig;
use zenoh_bridge_nut::config::NutBridgeConfig;
use zenoh_bridge_nut::driver::{CycleDriver, CycleSettings};
use zenoh_bridge_nut::nut::{NutCredentials, NutSession};
use zenoh_bridge_nut::sink::{MessageSink, SinkTimings, ZenohTransport};
use zenoh_bridge_nut::telemetry::Whitelist;

/// Zenoh bridge for Network UPS Tools.
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-nut")]
#[command(about = "Polls a NUT server and publishes UPS telemetry to Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "nut.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = NutBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    upsight_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting zenoh-bridge-nut");
    info!("Loaded configuration from {:?}", args.config);

    let credentials =
        NutCredentials::resolve(&config.nut).context("Invalid NUT credentials")?;

    let client_id = config
        .zenoh
        .client_id
        .clone()
        .unwrap_or_else(|| upsight_common::default_client_id("zenoh-bridge-nut"));
    let transport = ZenohTransport::new(&config.zenoh, &client_id)
        .context("Invalid Zenoh configuration")?;
    let cycle = CycleSettings::from_settings(&config.bridge).context("Invalid bridge settings")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // The sink connects in the background; collection waits for it.
    let (sink, supervisor) = MessageSink::new(transport, SinkTimings::from(&config.bridge));
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx.clone()));

    let session = NutSession::connect(&config.nut, &credentials)
        .await
        .with_context(|| format!("Failed to initialize NUT session with {}", config.nut.address()))?;

    let driver = CycleDriver::new(session, sink, Whitelist::default(), cycle);
    let mut driver_task = tokio::spawn(driver.run(shutdown_rx));

    info!(client_id = %client_id, "NUT bridge running");

    // Wait for shutdown signal or a fatal collection error
    let finished = tokio::select! {
        joined = &mut driver_task => Some(joined),
        _ = shutdown_signal() => None,
    };

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    let joined = match finished {
        Some(joined) => joined,
        None => driver_task.await,
    };
    let outcome = joined.context("Collection task failed")?;

    if tokio::time::timeout(Duration::from_secs(5), supervisor_task)
        .await
        .is_err()
    {
        warn!("Zenoh sink did not stop in time");
    }

    match outcome {
        Ok(session) => {
            // An interrupted session is dropped without LOGOUT.
            if let Some(session) = session {
                session.logout().await;
            }
            info!("NUT bridge stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "NUT polling failed");
            Err(e).context("NUT polling failed")
        }
    }
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Cannot listen for SIGTERM");
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
