//! Error types and handling for the client-core library
//!
//! This module defines every error that can surface from the signaling
//! client and classifies them for the reconnection controller.
//!
//! # Error Categories
//!
//! - **Configuration Errors** - The server answered without the credentials the
//!   backend needs, or the local configuration was rejected. Never retried.
//! - **Session Errors** - Creating a session or exchanging the offer failed.
//!   Retried within the reconnection bound.
//! - **Transport Errors** - The real-time link could not be built. Retried.
//! - **Teardown Errors** - Best-effort cleanup failed. Only ever logged.
//!
//! # Error Handling Guide
//!
//! ```rust,no_run
//! # use skylark_client_core::{SignalingClient, ClientError};
//! # use std::sync::Arc;
//! # async fn example(client: Arc<SignalingClient>) {
//! match client.start().await {
//!     Ok(()) => println!("call established"),
//!     Err(ClientError::Configuration { reason }) => {
//!         eprintln!("server is misconfigured: {}", reason);
//!         // Retrying will not help, fix the deployment first
//!     }
//!     Err(e) if e.is_recoverable() => {
//!         eprintln!("transient failure ({}): {}", e.category(), e);
//!     }
//!     Err(e) => eprintln!("unexpected error: {}", e),
//! }
//! # }
//! ```
//!
//! Errors raised during an automatic reconnection never reach the caller as a
//! `Result`; they are reported through [`ClientEvent`](crate::events::ClientEvent)
//! notifications instead.

use thiserror::Error;

/// Result type alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors produced by the signaling client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The session API answered without credentials the backend requires
    #[error("Backend configuration error: {reason}")]
    Configuration { reason: String },

    /// Local configuration rejected before the client was built
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Session creation failed (non-success status or network failure)
    #[error("Session creation failed: {reason}")]
    SessionCreate { reason: String },

    /// Offer/answer exchange failed
    #[error("Signaling failed: {reason}")]
    Signaling { reason: String },

    /// The real-time link could not be established
    #[error("Transport setup failed: {reason}")]
    TransportSetup { reason: String },

    /// Best-effort cleanup failed
    #[error("Teardown failed: {reason}")]
    Teardown { reason: String },

    #[error("Operation timeout after {duration_ms}ms")]
    OperationTimeout { duration_ms: u64 },

    /// An in-flight establish was superseded by `stop()` or a new `start()`
    #[error("Operation cancelled: superseded by a newer lifecycle request")]
    Cancelled,

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ClientError {
    /// Create a backend configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }

    /// Create an invalid local configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a session creation error
    pub fn session_create(reason: impl Into<String>) -> Self {
        Self::SessionCreate { reason: reason.into() }
    }

    /// Create a signaling error
    pub fn signaling(reason: impl Into<String>) -> Self {
        Self::Signaling { reason: reason.into() }
    }

    /// Create a transport setup error
    pub fn transport_setup(reason: impl Into<String>) -> Self {
        Self::TransportSetup { reason: reason.into() }
    }

    /// Create a teardown error
    pub fn teardown(reason: impl Into<String>) -> Self {
        Self::Teardown { reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Check if another reconnection attempt may fix this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::SessionCreate { .. }
            | ClientError::Signaling { .. }
            | ClientError::TransportSetup { .. }
            | ClientError::OperationTimeout { .. } => true,

            ClientError::Configuration { .. }
            | ClientError::InvalidConfiguration { .. }
            | ClientError::Teardown { .. }
            | ClientError::Cancelled
            | ClientError::InternalError { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::Configuration { .. } | ClientError::InvalidConfiguration { .. } => {
                "configuration"
            }
            ClientError::SessionCreate { .. } | ClientError::Signaling { .. } => "session",
            ClientError::TransportSetup { .. } | ClientError::OperationTimeout { .. } => "transport",
            ClientError::Teardown { .. } => "teardown",
            ClientError::Cancelled | ClientError::InternalError { .. } => "system",
        }
    }
}
