//! Event handling for client-core operations
//!
//! The host learns about the client exclusively through [`ClientEvent`]s.
//! They are delivered two ways: to an optional [`ClientEventHandler`] and to
//! every receiver obtained from `SignalingClient::subscribe_events`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::connection::{ConnectionState, MessageKind};

/// A status change reported to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// New normalized state
    pub state: ConnectionState,
    /// Human readable description
    pub text: String,
    /// When the status was emitted
    pub timestamp: DateTime<Utc>,
}

/// Events delivered to the host application
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection status changed
    StatusChanged(StatusInfo),
    /// Informational message for the user
    Message { kind: MessageKind, payload: String },
    /// Raw lifecycle label reported by the underlying link
    ConnectionStateChanged { raw: String },
}

impl ClientEvent {
    /// State carried by a status event
    pub fn state(&self) -> Option<ConnectionState> {
        match self {
            ClientEvent::StatusChanged(info) => Some(info.state),
            _ => None,
        }
    }
}

/// Host-side handler for client events
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// Handle a status change
    async fn on_status(&self, _state: ConnectionState, _text: &str) {}

    /// Handle a user-facing message
    async fn on_message(&self, _kind: MessageKind, _payload: &str) {}

    /// Handle a raw lifecycle label from the link
    async fn on_connection_state(&self, _raw: &str) {}

    /// Dispatch an event to the specific callbacks
    async fn on_client_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::StatusChanged(info) => self.on_status(info.state, &info.text).await,
            ClientEvent::Message { kind, payload } => self.on_message(kind, &payload).await,
            ClientEvent::ConnectionStateChanged { raw } => self.on_connection_state(&raw).await,
        }
    }
}

/// Fans events out to the registered handler and broadcast subscribers
pub struct EventDispatcher {
    handler: RwLock<Option<Arc<dyn ClientEventHandler>>>,
    event_tx: broadcast::Sender<ClientEvent>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handler", &"<event handler>")
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            handler: RwLock::new(None),
            event_tx,
        }
    }

    pub async fn set_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        *self.handler.write().await = Some(handler);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    pub async fn emit(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event.clone());

        let handler = self.handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_client_event(event).await;
        }
    }

    pub async fn status(&self, state: ConnectionState, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(state = %state, text = %text, "Status");
        self.emit(ClientEvent::StatusChanged(StatusInfo {
            state,
            text,
            timestamp: Utc::now(),
        }))
        .await;
    }

    pub async fn message(&self, kind: MessageKind, payload: impl Into<String>) {
        self.emit(ClientEvent::Message {
            kind,
            payload: payload.into(),
        })
        .await;
    }

    pub async fn connection_state(&self, raw: &str) {
        tracing::debug!(raw = raw, "Connection state");
        self.emit(ClientEvent::ConnectionStateChanged { raw: raw.to_string() })
            .await;
    }
}
