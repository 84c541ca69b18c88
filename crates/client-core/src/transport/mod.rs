//! Transport adapters
//!
//! A transport turns a [`SessionGrant`] into a live real-time link. Two
//! variants share one contract:
//!
//! - [`peer::PeerRelayTransport`] builds an audio-only peer link and relays the
//!   offer/answer and every local candidate through the session API.
//! - [`room::RoomTransport`] joins a managed room with the URL and token the
//!   session API handed out and publishes the microphone.
//!
//! The actual real-time primitives are supplied by the host through the
//! [`peer::PeerEngine`] and [`room::RoomEngine`] traits. Lifecycle signals flow
//! back to the client through a [`LinkEventSender`] instead of callbacks.

pub mod peer;
pub mod room;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::connection::LinkEvent;
use crate::error::ClientResult;
use crate::session::SessionGrant;

pub use peer::{PeerEngine, PeerLink, PeerOptions, PeerRelayTransport, PeerSignal};
pub use room::{AudioSinks, RemoteTrack, RoomEngine, RoomEvent, RoomLink, RoomOptions, RoomTransport, TrackKind};

/// Which backend the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Media server brokered SDP exchange
    PeerRelay,
    /// Selective forwarding unit room service
    Room,
}

impl BackendKind {
    /// Default API path of the signaling service for this backend
    pub fn default_api_path(&self) -> &'static str {
        match self {
            BackendKind::PeerRelay => "/api/webrtc/kurento",
            BackendKind::Room => "/api/webrtc/livekit",
        }
    }

    /// Whether the underlying library recovers dropped links by itself
    pub fn recovers_natively(&self) -> bool {
        matches!(self, BackendKind::Room)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::PeerRelay => f.write_str("peer-relay"),
            BackendKind::Room => f.write_str("room"),
        }
    }
}

/// A [`LinkEvent`] stamped with the generation of the link that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedLinkEvent {
    pub generation: u64,
    pub event: LinkEvent,
}

/// Channel handed to a transport for reporting lifecycle signals
///
/// Events are stamped with the link generation so the client can drop
/// anything a retired link says after it was replaced.
#[derive(Debug, Clone)]
pub struct LinkEventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedLinkEvent>,
}

impl LinkEventSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedLinkEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report a signal. Returns false once the client is gone.
    pub fn send(&self, event: LinkEvent) -> bool {
        self.tx
            .send(TaggedLinkEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// A live real-time link owned by the client
#[async_trait]
pub trait LiveLink: Send + Sync {
    /// Release the link. Best-effort; never fails.
    async fn dispose(&mut self);
}

/// Builds live links from session grants
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Backend this adapter speaks to
    fn backend(&self) -> BackendKind;

    /// Establish a link for `grant`, reporting lifecycle signals to `events`
    async fn connect(&self, grant: &SessionGrant, events: LinkEventSender) -> ClientResult<Box<dyn LiveLink>>;
}
