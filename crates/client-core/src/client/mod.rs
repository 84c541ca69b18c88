//! High-level signaling client
//!
//! - **`manager`** - [`SignalingClient`], the lifecycle and reconnection controller
//! - **`builder`** - [`ClientBuilder`] wiring configuration and primitives together
//! - **`config`** - [`ClientConfig`] and its TOML form
//! - **`recovery`** - Backoff policy and retry bookkeeping
//! - **`types`** - Status snapshots
//!
//! # Usage Guide
//!
//! ```rust,no_run
//! # use skylark_client_core::{ClientBuilder, ClientEvent, ConnectionState};
//! # use skylark_client_core::transport::PeerEngine;
//! # use std::sync::Arc;
//! # async fn example(engine: Arc<dyn PeerEngine>) -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new()
//!     .server_origin("https://robot.example.com")
//!     .peer_engine(engine)
//!     .build()
//!     .await?;
//!
//! let mut events = client.subscribe_events();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let ClientEvent::StatusChanged(info) = event {
//!             println!("{}: {}", info.state, info.text);
//!             if info.state == ConnectionState::Failed {
//!                 break;
//!             }
//!         }
//!     }
//! });
//!
//! client.start().await?;
//! // ... talk ...
//! client.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! Once reconnection is exhausted the client stays in `failed` until the host
//! calls `start()` again.

pub mod builder;
pub mod config;
pub mod manager;
pub mod recovery;
pub mod types;

pub use builder::ClientBuilder;
pub use config::{AudioProcessing, ClientConfig};
pub use manager::SignalingClient;
pub use recovery::{with_timeout, ReconnectPhase, RetryConfig, RetryState};
pub use types::ClientStatus;
