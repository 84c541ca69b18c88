//! Client-core: voice-call signaling client
//!
//! Connects a user to a voice robot over a real-time audio link. The crate
//! coordinates three parties:
//!
//! ```text
//! SignalingClient -> SessionApi (HTTP)        create / offer / ice-candidate / delete
//!                 -> TransportAdapter         peer-relay | room
//!                        -> PeerEngine / RoomEngine (host supplied)
//! ```
//!
//! Client-core focuses on:
//! - Session lifecycle against the signaling service
//! - Normalizing backend lifecycle signals into one connection state
//! - Bounded, exclusive reconnection with exponential backoff
//! - Event delivery for UI integration
//!
//! Media capture, codecs and rendering are handled by the host's real-time
//! primitives.

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod session;
pub mod transport;

pub use client::{
    AudioProcessing, ClientBuilder, ClientConfig, ClientStatus, ReconnectPhase, RetryConfig, RetryState,
    SignalingClient,
};
pub use connection::{ConnectionState, IceConnectionState, LinkEvent, MessageKind};
pub use error::{ClientError, ClientResult};
pub use events::{ClientEvent, ClientEventHandler, StatusInfo};
pub use session::{BackendCredentials, HttpSessionApi, IceCandidate, SessionApi, SessionGrant, SessionId};
pub use transport::{BackendKind, LinkEventSender, LiveLink, TransportAdapter};

/// Client-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
