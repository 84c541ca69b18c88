//! Connection state tracking
//!
//! Transports report backend-specific lifecycle signals as [`LinkEvent`]s.
//! [`observe`] maps each one onto the normalized [`ConnectionState`] reported
//! to the host and decides whether the reconnection controller must step in.
//!
//! The two backends are asymmetric:
//!
//! ```text
//! peer-relay: ICE failed          -> failed       -> escalate
//!             ICE disconnected    -> disconnected (informational)
//! room:       reconnecting        -> reconnecting (library recovers natively)
//!             reconnected         -> connected, retry state reset
//!             disconnected        -> disconnected -> escalate (native recovery gave up)
//! ```

use serde::{Deserialize, Serialize};

/// Normalized connection state reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Nothing started yet
    Idle,
    /// Session or link is being set up
    Connecting,
    /// Media path is up
    Connected,
    /// Link dropped (momentarily or for good)
    Disconnected,
    /// A reconnection is in progress
    Reconnecting,
    /// The link failed or reconnection was exhausted
    Failed,
}

impl ConnectionState {
    /// Wire/host label of this state
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ICE connectivity as reported by the peer primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Closed => "closed",
        }
    }
}

/// Lifecycle signal emitted by a live link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Peer-relay: remote answer applied, media path negotiated
    Negotiated,
    /// Peer-relay: ICE connectivity changed
    IceStateChanged(IceConnectionState),
    /// Room: connected to the room
    RoomConnected,
    /// Room: the room library started its own reconnection
    RoomReconnecting,
    /// Room: the room library recovered the link
    RoomReconnected,
    /// Room: the room object is gone for good
    RoomDisconnected { reason: Option<String> },
    /// A remote audio track was attached to a playback sink
    RemoteAudioAttached { participant_id: String },
    /// A remote audio track was detached from its sink
    RemoteAudioDetached { participant_id: String },
    /// Connection quality report for a participant
    ConnectionQuality { participant_id: String, quality: String },
    /// Local capture device failed
    MediaDeviceError { message: String },
}

/// Kind of host message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    Success,
    Error,
}

/// What the controller should do with a [`LinkEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    /// New normalized state and its status text
    pub state: Option<(ConnectionState, String)>,
    /// Raw lifecycle label forwarded to the host
    pub raw: Option<&'static str>,
    /// Message for the host
    pub message: Option<(MessageKind, String)>,
    /// Clear the retry counter
    pub reset_retry: bool,
    /// Hand the failure to the reconnection controller
    pub escalate: bool,
    /// Link is down but may recover on its own (peer-relay `disconnected`)
    pub may_recover: bool,
}

impl Observation {
    fn state(state: ConnectionState, text: impl Into<String>) -> Self {
        Self {
            state: Some((state, text.into())),
            raw: Some(state.as_str()),
            ..Default::default()
        }
    }
}

/// Map a backend lifecycle signal onto the normalized contract
pub fn observe(event: &LinkEvent) -> Observation {
    match event {
        LinkEvent::Negotiated => Observation {
            message: Some((MessageKind::Success, "WebRTC connection established".to_string())),
            reset_retry: true,
            ..Observation::state(ConnectionState::Connected, "Call established")
        },
        LinkEvent::IceStateChanged(ice) => match ice {
            IceConnectionState::Connected | IceConnectionState::Completed => Observation {
                reset_retry: true,
                ..Observation::state(ConnectionState::Connected, "Call established")
            },
            IceConnectionState::Disconnected => Observation {
                may_recover: true,
                ..Observation::state(ConnectionState::Disconnected, "Connection interrupted")
            },
            IceConnectionState::Failed => Observation {
                escalate: true,
                ..Observation::state(ConnectionState::Failed, "Connection failed")
            },
            IceConnectionState::New | IceConnectionState::Checking | IceConnectionState::Closed => {
                Observation {
                    raw: Some(ice.as_str()),
                    ..Default::default()
                }
            }
        },
        LinkEvent::RoomConnected => Observation {
            message: Some((MessageKind::Success, "WebRTC connection established".to_string())),
            reset_retry: true,
            ..Observation::state(ConnectionState::Connected, "Call established")
        },
        LinkEvent::RoomReconnecting => {
            Observation::state(ConnectionState::Reconnecting, "Reconnecting...")
        }
        LinkEvent::RoomReconnected => Observation {
            message: Some((MessageKind::System, "Reconnected".to_string())),
            reset_retry: true,
            ..Observation::state(ConnectionState::Connected, "Reconnected")
        },
        LinkEvent::RoomDisconnected { .. } => Observation {
            escalate: true,
            ..Observation::state(ConnectionState::Disconnected, "Connection lost")
        },
        LinkEvent::RemoteAudioAttached { .. } => Observation {
            message: Some((MessageKind::System, "Remote audio received".to_string())),
            ..Default::default()
        },
        LinkEvent::MediaDeviceError { message } => Observation {
            message: Some((MessageKind::Error, format!("Media device error: {}", message))),
            ..Default::default()
        },
        LinkEvent::RemoteAudioDetached { .. } | LinkEvent::ConnectionQuality { .. } => {
            Observation::default()
        }
    }
}
