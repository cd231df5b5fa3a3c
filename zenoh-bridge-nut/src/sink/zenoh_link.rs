//! Zenoh-backed [`Transport`] and [`Link`].
//!
//! In client mode a session is only useful while it reaches a router or a
//! peer, so liveness requires one to be visible. Peer and router sessions
//! stand on their own and stay alive until closed.

use tracing::{debug, warn};
use upsight_common::ZenohConfig;

use super::{Link, SinkError, Transport};

/// Whether sessions opened in `mode` need a remote node to be considered alive.
fn needs_remote(mode: &str) -> bool {
    mode == "client"
}

/// Opens Zenoh sessions from a prebuilt configuration.
pub struct ZenohTransport {
    config: zenoh::Config,
    endpoint: String,
    needs_remote: bool,
}

impl ZenohTransport {
    /// Build the session configuration once; errors here are permanent.
    pub fn new(config: &ZenohConfig, client_id: &str) -> Result<Self, SinkError> {
        let zenoh_config = upsight_common::build_config(config, client_id)?;

        let endpoint = if config.connect.is_empty() {
            format!("{} (scouting)", config.mode)
        } else {
            config.connect.join(",")
        };

        debug!(
            mode = %config.mode,
            connect = ?config.connect,
            client_id = %client_id,
            "Zenoh transport configured"
        );

        Ok(Self {
            config: zenoh_config,
            endpoint,
            needs_remote: needs_remote(&config.mode),
        })
    }
}

impl Transport for ZenohTransport {
    type Link = ZenohLink;

    async fn open(&self) -> Result<ZenohLink, SinkError> {
        let session = zenoh::open(self.config.clone())
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        debug!(zid = %session.zid(), "Zenoh session opened");
        Ok(ZenohLink {
            session,
            needs_remote: self.needs_remote,
        })
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// An open Zenoh session.
#[derive(Clone)]
pub struct ZenohLink {
    session: zenoh::Session,
    needs_remote: bool,
}

impl Link for ZenohLink {
    async fn put(&self, topic: String, message: String) -> Result<(), SinkError> {
        self.session
            .put(&topic, message)
            .await
            .map_err(|e| SinkError::Publish {
                key: topic.clone(),
                message: e.to_string(),
            })
    }

    async fn is_alive(&self) -> bool {
        if self.session.is_closed() {
            return false;
        }
        if !self.needs_remote {
            return true;
        }

        let info = self.session.info();
        if info.routers_zid().await.next().is_some() {
            return true;
        }
        info.peers_zid().await.next().is_some()
    }

    async fn close(&self) {
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "Failed to close Zenoh session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zenoh_config(mode: &str) -> ZenohConfig {
        ZenohConfig {
            mode: mode.to_string(),
            ..ZenohConfig::default()
        }
    }

    #[test]
    fn test_only_client_mode_needs_remote() {
        assert!(needs_remote("client"));
        assert!(!needs_remote("peer"));
        assert!(!needs_remote("router"));
    }

    #[test]
    fn test_transport_liveness_follows_mode() {
        let client = ZenohTransport::new(&zenoh_config("client"), "test").unwrap();
        assert!(client.needs_remote);

        let peer = ZenohTransport::new(&zenoh_config("peer"), "test").unwrap();
        assert!(!peer.needs_remote);
        assert_eq!(peer.endpoint(), "peer (scouting)");
    }

    /// A lone peer session has nobody to talk to and must still stay up.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lone_peer_session_stays_alive() {
        let config = ZenohConfig {
            listen: vec!["tcp/127.0.0.1:0".to_string()],
            ..zenoh_config("peer")
        };
        let transport = ZenohTransport::new(&config, "lone-peer").unwrap();
        let link = transport.open().await.expect("Failed to open Zenoh session");

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(link.is_alive().await);

        link.close().await;
        assert!(!link.is_alive().await);
    }
}
