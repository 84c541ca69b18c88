//! Snapshot types returned by the client

use serde::{Deserialize, Serialize};

use crate::client::recovery::ReconnectPhase;
use crate::connection::ConnectionState;
use crate::session::SessionId;
use crate::transport::BackendKind;

/// Point-in-time view of a [`SignalingClient`](crate::SignalingClient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub backend: BackendKind,
    /// Last state reported to the host
    pub state: ConnectionState,
    /// Text of the last status
    pub text: String,
    /// Session id currently held, if any
    pub session_id: Option<SessionId>,
    /// Both a session and a live link are held
    pub is_active: bool,
    pub reconnect_phase: ReconnectPhase,
    pub attempt_count: u32,
    pub max_attempts: u32,
}

impl ClientStatus {
    /// True when the host has to call `start()` to get a call back
    pub fn needs_restart(&self) -> bool {
        self.reconnect_phase == ReconnectPhase::Exhausted
    }
}
