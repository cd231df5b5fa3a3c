//! Self-healing publish connection to the Zenoh network.
//!
//! [`MessageSink::new`] returns two halves:
//! - a cheap, cloneable [`MessageSink`] handle used to publish and to query
//!   connectivity;
//! - a [`SinkSupervisor`] that owns the connection lifecycle and must be
//!   spawned by the caller.
//!
//! The supervisor retries with a fixed backoff until a connection is
//! established, then probes it periodically and starts over when it is lost.
//!
//! ```ignore
//! let transport = ZenohTransport::new(&config.zenoh, &client_id)?;
//! let (sink, supervisor) = MessageSink::new(transport, SinkTimings::default());
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(supervisor.run(shutdown_rx));
//!
//! if sink.is_connected() {
//!     sink.publish("v1/ups/rack/ups.load", "17")
//!         .wait_timeout(Duration::from_secs(10))
//!         .await?;
//! }
//! ```

mod zenoh_link;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::BridgeSettings;

pub use zenoh_link::{ZenohLink, ZenohTransport};

/// Errors raised by a transport or link.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Connection could not be established.
    #[error("Zenoh connection error: {0}")]
    Connection(String),

    /// The router rejected or failed a publication.
    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },

    /// Invalid session configuration.
    #[error(transparent)]
    Config(#[from] upsight_common::Error),
}

/// Outcome of waiting on a [`PublishToken`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not connected to Zenoh")]
    NotConnected,
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Failed(#[from] SinkError),
    #[error("publish task was cancelled")]
    Cancelled,
}

/// Opens connections to the publish side.
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    /// Open a new connection.
    fn open(&self) -> impl Future<Output = Result<Self::Link, SinkError>> + Send;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

/// An established connection.
pub trait Link: Clone + Send + Sync + 'static {
    /// Publish `message` on `topic`, resolving once the link accepted it.
    fn put(
        &self,
        topic: String,
        message: String,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Whether the connection still reaches the network.
    fn is_alive(&self) -> impl Future<Output = bool> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Timing of the supervisor's connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkTimings {
    /// Upper bound for a single connection attempt.
    pub connect_timeout: Duration,
    /// Pause between failed attempts.
    pub retry_backoff: Duration,
    /// Interval between liveness probes while connected.
    pub liveness_interval: Duration,
}

impl Default for SinkTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(5),
            liveness_interval: Duration::from_secs(1),
        }
    }
}

impl From<&BridgeSettings> for SinkTimings {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            retry_backoff: Duration::from_secs(settings.retry_backoff_secs),
            liveness_interval: Duration::from_secs(settings.liveness_interval_secs),
        }
    }
}

/// State shared between the handle and the supervisor.
///
/// Only the supervisor writes it.
struct Shared<L> {
    connected: AtomicBool,
    link: RwLock<Option<L>>,
}

impl<L: Link> Shared<L> {
    fn set_link(&self, link: Option<L>) {
        let connected = link.is_some();
        *self.link.write().unwrap_or_else(PoisonError::into_inner) = link;
        self.connected.store(connected, Ordering::Release);
    }

    fn current_link(&self) -> Option<L> {
        self.link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle for publishing through the supervised connection.
pub struct MessageSink<L> {
    shared: Arc<Shared<L>>,
}

impl<L> Clone for MessageSink<L> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<L: Link> MessageSink<L> {
    /// Create a sink and the supervisor that will connect it.
    ///
    /// Nothing happens until the supervisor is run.
    pub fn new<T>(transport: T, timings: SinkTimings) -> (Self, SinkSupervisor<T>)
    where
        T: Transport<Link = L>,
    {
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            link: RwLock::new(None),
        });

        let supervisor = SinkSupervisor {
            transport,
            shared: shared.clone(),
            timings,
        };

        (Self { shared }, supervisor)
    }

    /// Whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Start publishing `message` on `topic` without waiting for it.
    pub fn publish(&self, topic: impl Into<String>, message: impl Into<String>) -> PublishToken {
        let link = if self.is_connected() {
            self.shared.current_link()
        } else {
            None
        };

        match link {
            Some(link) => {
                let topic = topic.into();
                let message = message.into();
                PublishToken::pending(tokio::spawn(async move { link.put(topic, message).await }))
            }
            None => PublishToken::ready(Err(PublishError::NotConnected)),
        }
    }
}

/// Completion handle of a publish.
#[must_use = "a publish token does nothing unless waited on"]
pub struct PublishToken {
    inner: TokenInner,
}

enum TokenInner {
    Ready(Result<(), PublishError>),
    Pending(JoinHandle<Result<(), SinkError>>),
}

impl PublishToken {
    fn ready(result: Result<(), PublishError>) -> Self {
        Self {
            inner: TokenInner::Ready(result),
        }
    }

    fn pending(handle: JoinHandle<Result<(), SinkError>>) -> Self {
        Self {
            inner: TokenInner::Pending(handle),
        }
    }

    /// Wait for the publish to complete, giving up after `timeout`.
    ///
    /// On timeout the in-flight publish is cancelled.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<(), PublishError> {
        match self.inner {
            TokenInner::Ready(result) => result,
            TokenInner::Pending(mut handle) => {
                match tokio::time::timeout(timeout, &mut handle).await {
                    Ok(Ok(result)) => result.map_err(PublishError::from),
                    Ok(Err(_)) => Err(PublishError::Cancelled),
                    Err(_) => {
                        handle.abort();
                        Err(PublishError::Timeout(timeout))
                    }
                }
            }
        }
    }
}

/// Background task owning the connection lifecycle.
pub struct SinkSupervisor<T: Transport> {
    transport: T,
    shared: Arc<Shared<T::Link>>,
    timings: SinkTimings,
}

impl<T: Transport> SinkSupervisor<T> {
    /// Keep the sink connected until `shutdown` turns `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let endpoint = self.transport.endpoint();

        while let Some(link) = self.connect(&endpoint, &mut shutdown).await {
            self.shared.set_link(Some(link.clone()));
            info!(endpoint = %endpoint, "Connected to Zenoh");

            let lost = self.watch(&link, &mut shutdown).await;
            if lost {
                warn!(endpoint = %endpoint, "Connection to Zenoh lost");
            }

            self.shared.set_link(None);
            link.close().await;

            if !lost {
                break;
            }
        }

        info!(endpoint = %endpoint, "Zenoh sink stopped");
    }

    /// Attempt to connect until it succeeds. `None` on shutdown.
    async fn connect(
        &self,
        endpoint: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<T::Link> {
        let mut attempt: u64 = 0;

        loop {
            if *shutdown.borrow() {
                return None;
            }

            attempt += 1;
            info!(endpoint = %endpoint, attempt, "Attempting to connect to Zenoh");

            match tokio::time::timeout(self.timings.connect_timeout, self.transport.open()).await {
                Ok(Ok(link)) => return Some(link),
                Ok(Err(e)) => {
                    error!(endpoint = %endpoint, error = %e, "Failed to connect to Zenoh");
                }
                Err(_) => {
                    error!(endpoint = %endpoint, "Timeout connecting to Zenoh");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.timings.retry_backoff) => {}
                _ = stopped(shutdown) => return None,
            }
        }
    }

    /// Probe the link until it dies (`true`) or shutdown is requested (`false`).
    async fn watch(&self, link: &T::Link, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.timings.liveness_interval) => {}
                _ = stopped(shutdown) => return false,
            }

            if !link.is_alive().await {
                return true;
            }
        }
    }
}

/// Resolve once shutdown is requested. Never resolves if the sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeTransport;
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn spawn_sink(
        transport: &FakeTransport,
    ) -> (MessageSink<testing::FakeLink>, watch::Sender<bool>, JoinHandle<()>) {
        let (sink, supervisor) = MessageSink::new(transport.clone(), SinkTimings::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor.run(shutdown_rx));
        (sink, shutdown_tx, task)
    }

    #[test]
    fn test_timings_from_settings() {
        let settings = BridgeSettings {
            connect_timeout_secs: 7,
            retry_backoff_secs: 9,
            liveness_interval_secs: 2,
            ..BridgeSettings::default()
        };
        let timings = SinkTimings::from(&settings);

        assert_eq!(timings.connect_timeout, secs(7));
        assert_eq!(timings.retry_backoff, secs(9));
        assert_eq!(timings.liveness_interval, secs(2));
        assert_eq!(
            SinkTimings::from(&BridgeSettings::default()),
            SinkTimings::default()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_connected_before_supervisor_runs() {
        let (sink, _supervisor) = MessageSink::new(FakeTransport::default(), SinkTimings::default());

        assert!(!sink.is_connected());
        let result = sink.publish("v1/ups/a/ups.load", "1").wait_timeout(secs(10)).await;
        assert!(matches!(result, Err(PublishError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_failures() {
        let transport = FakeTransport::failing(3);
        let (sink, shutdown, task) = spawn_sink(&transport);

        // Attempts at t=0, 5 and 10 fail; the fourth, at t=15, succeeds.
        tokio::time::sleep(secs(14)).await;
        assert!(!sink.is_connected());
        assert_eq!(transport.attempts(), 3);

        tokio::time::sleep(secs(2)).await;
        assert!(sink.is_connected());
        assert_eq!(transport.attempts(), 4);

        shutdown.send(true).unwrap();
        task.await.unwrap();
        assert!(!sink.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_attempt_times_out() {
        let transport = FakeTransport::default();
        transport.set_hang(true);
        let (sink, shutdown, task) = spawn_sink(&transport);

        // t=0 attempt, t=5 timeout, t=10 second attempt.
        tokio::time::sleep(secs(11)).await;
        assert_eq!(transport.attempts(), 2);
        assert!(!sink.is_connected());

        shutdown.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_connection_is_restored() {
        let transport = FakeTransport::default();
        let (sink, shutdown, task) = spawn_sink(&transport);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sink.is_connected());

        transport.fail_next(1);
        transport.link.set_alive(false);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!sink.is_connected());
        assert_eq!(transport.attempts(), 2);

        transport.link.set_alive(true);
        tokio::time::sleep(secs(5)).await;
        assert!(sink.is_connected());
        assert_eq!(transport.attempts(), 3);

        shutdown.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_delivers() {
        let transport = FakeTransport::default();
        let (sink, shutdown, task) = spawn_sink(&transport);
        tokio::time::sleep(Duration::from_millis(100)).await;

        sink.publish("v1/ups/rack/ups.load", "17")
            .wait_timeout(secs(10))
            .await
            .unwrap();

        assert_eq!(
            transport.link.published(),
            vec![("v1/ups/rack/ups.load".to_string(), "17".to_string())]
        );

        shutdown.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout_and_failure() {
        let transport = FakeTransport::default();
        let (sink, shutdown, task) = spawn_sink(&transport);
        tokio::time::sleep(Duration::from_millis(100)).await;

        transport.link.set_hang(true);
        let start = tokio::time::Instant::now();
        let result = sink.publish("v1/ups/a/ups.load", "1").wait_timeout(secs(10)).await;
        assert!(matches!(result, Err(PublishError::Timeout(t)) if t == secs(10)));
        assert!(start.elapsed() >= secs(10) && start.elapsed() < secs(11));

        transport.link.set_hang(false);
        transport.link.set_fail(true);
        let result = sink.publish("v1/ups/a/ups.load", "1").wait_timeout(secs(10)).await;
        assert!(matches!(
            result,
            Err(PublishError::Failed(SinkError::Publish { .. }))
        ));

        // Publish errors do not affect connectivity.
        assert!(sink.is_connected());
        assert!(transport.link.published().is_empty());

        shutdown.send(true).unwrap();
        task.await.unwrap();
    }
}
