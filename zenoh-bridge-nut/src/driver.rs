//! Collect-and-publish cycle gated on sink connectivity.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use upsight_common::KeyExprBuilder;

use crate::config::BridgeSettings;
use crate::nut::{NutError, TelemetrySource};
use crate::sink::{Link, MessageSink, PublishError, stopped};
use crate::telemetry::Whitelist;

/// Timing and naming of the cycle.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub keys: KeyExprBuilder,
    /// Pause after a completed publish cycle.
    pub poll_interval: Duration,
    /// Pause before every connectivity check.
    pub idle_interval: Duration,
    /// Maximum wait for each publish.
    pub publish_timeout: Duration,
}

impl CycleSettings {
    pub fn from_settings(settings: &BridgeSettings) -> upsight_common::Result<Self> {
        Ok(Self {
            keys: KeyExprBuilder::with_prefix(&settings.key_prefix)?,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            idle_interval: Duration::from_secs(settings.idle_interval_secs),
            publish_timeout: Duration::from_secs(settings.publish_timeout_secs),
        })
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            keys: KeyExprBuilder::new(),
            poll_interval: Duration::from_secs(12),
            idle_interval: Duration::from_secs(3),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Active,
}

/// Publish counters of one active cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    pub published: usize,
    pub failed: usize,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The sink was disconnected; nothing was read.
    Idle,
    /// Metrics were collected and published.
    Active(PublishStats),
}

/// Reads the source and publishes through the sink while it is connected.
pub struct CycleDriver<S, L> {
    source: S,
    sink: MessageSink<L>,
    whitelist: Whitelist,
    settings: CycleSettings,
    state: CycleState,
    /// Set while a `collect` is in flight.
    collecting: bool,
}

impl<S: TelemetrySource, L: Link> CycleDriver<S, L> {
    pub fn new(source: S, sink: MessageSink<L>, whitelist: Whitelist, settings: CycleSettings) -> Self {
        Self {
            source,
            sink,
            whitelist,
            settings,
            state: CycleState::Idle,
            collecting: false,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Run one cycle without pausing.
    ///
    /// A source error is fatal and returned as is. Publish failures are only
    /// logged and counted.
    pub async fn tick(&mut self) -> Result<Tick, NutError> {
        if !self.sink.is_connected() {
            if self.state == CycleState::Active {
                info!("Zenoh disconnected, pausing collection");
            }
            self.state = CycleState::Idle;
            return Ok(Tick::Idle);
        }

        if self.state == CycleState::Idle {
            info!("Zenoh connected, resuming collection");
        }
        self.state = CycleState::Active;

        self.collecting = true;
        let metrics = self.source.collect(&self.whitelist).await;
        self.collecting = false;
        let metrics = metrics?;

        let mut stats = PublishStats::default();
        for metric in metrics {
            let topic = self.settings.keys.qualify(&metric.topic);
            debug!(topic = %topic, msg = %metric.message, "Found metric");

            let result = self
                .sink
                .publish(topic.clone(), metric.message.clone())
                .wait_timeout(self.settings.publish_timeout)
                .await;

            match result {
                Ok(()) => stats.published += 1,
                Err(PublishError::Timeout(_)) => {
                    error!(topic = %topic, msg = %metric.message, "Timeout sending message");
                    stats.failed += 1;
                }
                Err(e) => {
                    error!(topic = %topic, msg = %metric.message, error = %e, "Failed to send message");
                    stats.failed += 1;
                }
            }
        }

        Ok(Tick::Active(stats))
    }

    /// Cycle until `shutdown` turns `true` or the source fails.
    ///
    /// Returns the source on shutdown so the caller can close it, or `None`
    /// when shutdown interrupted a `collect` and left the source mid-request.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<Option<S>, NutError> {
        info!(
            prefix = %self.settings.keys.prefix(),
            variables = ?self.whitelist.names().collect::<Vec<_>>(),
            poll_interval = ?self.settings.poll_interval,
            "Starting collection cycle"
        );

        loop {
            let tick = tokio::select! {
                tick = self.tick() => Some(tick?),
                _ = stopped(&mut shutdown) => None,
            };

            let pause = match tick {
                None if self.collecting => {
                    warn!("Shutdown interrupted a NUT request, dropping the session");
                    return Ok(None);
                }
                None => break,
                Some(Tick::Idle) => self.settings.idle_interval,
                Some(Tick::Active(stats)) => {
                    debug!(
                        published = stats.published,
                        failed = stats.failed,
                        "Publish cycle complete"
                    );
                    self.settings.poll_interval + self.settings.idle_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stopped(&mut shutdown) => break,
            }
        }

        info!("Collection cycle stopped");
        Ok(Some(self.source))
    }
}
