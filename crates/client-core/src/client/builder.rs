//! Client builder
//!
//! Collects the configuration and the host-supplied real-time primitives and
//! wires them into a [`SignalingClient`]. The backend chosen in the
//! configuration decides which primitive is required:
//!
//! - peer-relay needs a [`PeerEngine`]
//! - room needs a [`RoomEngine`] and the [`AudioSinks`] that play remote audio
//!
//! A ready-made [`TransportAdapter`] may be supplied instead of either.
//!
//! ```rust,no_run
//! # use skylark_client_core::{ClientBuilder, BackendKind};
//! # use skylark_client_core::transport::{RoomEngine, AudioSinks};
//! # use std::sync::Arc;
//! # async fn example(engine: Arc<dyn RoomEngine>, sinks: Arc<dyn AudioSinks>) -> skylark_client_core::ClientResult<()> {
//! let client = ClientBuilder::new()
//!     .server_origin("https://robot.example.com")
//!     .backend(BackendKind::Room)
//!     .room_engine(engine, sinks)
//!     .build()
//!     .await?;
//!
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::config::{AudioProcessing, ClientConfig};
use super::manager::SignalingClient;
use super::recovery::RetryConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEventHandler, EventDispatcher};
use crate::session::{HttpSessionApi, SessionApi};
use crate::transport::{
    AudioSinks, BackendKind, PeerEngine, PeerRelayTransport, RoomEngine, RoomTransport, TransportAdapter,
};

/// Builder for [`SignalingClient`]
pub struct ClientBuilder {
    config: ClientConfig,
    peer_engine: Option<Arc<dyn PeerEngine>>,
    room: Option<(Arc<dyn RoomEngine>, Arc<dyn AudioSinks>)>,
    transport: Option<Arc<dyn TransportAdapter>>,
    session_api: Option<Arc<dyn SessionApi>>,
    event_handler: Option<Arc<dyn ClientEventHandler>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            peer_engine: None,
            room: None,
            transport: None,
            session_api: None,
            event_handler: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn server_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.server_origin = origin.into();
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn api_path(mut self, path: impl Into<String>) -> Self {
        self.config.api_path = Some(path.into());
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn disconnect_grace(mut self, grace: Duration) -> Self {
        self.config.disconnect_grace = Some(grace);
        self
    }

    pub fn audio(mut self, audio: AudioProcessing) -> Self {
        self.config.audio = audio;
        self
    }

    /// Peer primitive used by the peer-relay backend
    pub fn peer_engine(mut self, engine: Arc<dyn PeerEngine>) -> Self {
        self.peer_engine = Some(engine);
        self
    }

    /// Room primitive and playback sinks used by the room backend
    pub fn room_engine(mut self, engine: Arc<dyn RoomEngine>, sinks: Arc<dyn AudioSinks>) -> Self {
        self.room = Some((engine, sinks));
        self
    }

    /// Use a custom transport instead of the built-in ones
    pub fn transport(mut self, transport: Arc<dyn TransportAdapter>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom session API instead of HTTP
    pub fn session_api(mut self, api: Arc<dyn SessionApi>) -> Self {
        self.session_api = Some(api);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn ClientEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Validate the configuration and build the client
    ///
    /// Must be called inside a tokio runtime.
    pub async fn build(self) -> ClientResult<Arc<SignalingClient>> {
        let config = self.config;
        config.validate()?;

        let session_api: Arc<dyn SessionApi> = match self.session_api {
            Some(api) => api,
            None => Arc::new(HttpSessionApi::new(
                config.api_base_url()?,
                config.backend,
                config.request_timeout,
            )?),
        };

        let adapter: Arc<dyn TransportAdapter> = match (self.transport, config.backend) {
            (Some(transport), _) => transport,
            (None, BackendKind::PeerRelay) => {
                let engine = self.peer_engine.ok_or_else(|| {
                    ClientError::invalid_configuration("peer_engine", "required for the peer-relay backend")
                })?;
                Arc::new(PeerRelayTransport::new(engine, session_api.clone(), config.audio))
            }
            (None, BackendKind::Room) => {
                let (engine, sinks) = self.room.ok_or_else(|| {
                    ClientError::invalid_configuration("room_engine", "required for the room backend")
                })?;
                Arc::new(RoomTransport::new(engine, sinks, config.audio))
            }
        };

        if adapter.backend() != config.backend {
            return Err(ClientError::invalid_configuration(
                "backend",
                format!(
                    "configured for {} but the transport speaks {}",
                    config.backend,
                    adapter.backend()
                ),
            ));
        }

        let events = Arc::new(EventDispatcher::new(config.event_capacity));
        if let Some(handler) = self.event_handler {
            events.set_handler(handler).await;
        }

        info!(backend = %config.backend, max_attempts = config.retry.max_attempts, "Signaling client built");
        Ok(SignalingClient::new(config, session_api, adapter, events))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
