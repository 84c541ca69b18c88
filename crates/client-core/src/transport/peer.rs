//! Peer-relay transport
//!
//! Offer is generated locally, answered by the media server through the
//! session API, and every local candidate is pushed individually as soon as
//! it is discovered. Candidate posts are unordered with respect to each other
//! and to the offer/answer exchange, and their failures never affect it.
//!
//! There is no native reconnection on this backend: ICE `failed` is escalated
//! to the client's reconnection controller.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BackendKind, LinkEventSender, LiveLink, TransportAdapter};
use crate::client::config::AudioProcessing;
use crate::connection::{IceConnectionState, LinkEvent};
use crate::error::{ClientError, ClientResult};
use crate::session::{BackendCredentials, IceCandidate, SessionApi, SessionGrant, SessionId};

/// Options for creating the peer link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOptions {
    /// Capture processing for the local microphone
    pub audio: AudioProcessing,
    /// Request a video track (always false for voice calls)
    pub video: bool,
}

/// Signals raised by the peer primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSignal {
    /// A local candidate was discovered
    LocalCandidate(IceCandidate),
    /// ICE connectivity changed
    IceStateChanged(IceConnectionState),
}

/// Factory for bidirectional audio peer links
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Create a send/receive peer. Signals are reported on `signals`.
    async fn create_peer(
        &self,
        options: &PeerOptions,
        signals: mpsc::UnboundedSender<PeerSignal>,
    ) -> ClientResult<Box<dyn PeerLink>>;
}

/// A peer link created by a [`PeerEngine`]
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Generate the local session description
    async fn create_offer(&mut self) -> ClientResult<String>;

    /// Apply the remote answer
    async fn apply_answer(&mut self, sdp_answer: &str) -> ClientResult<()>;

    /// Close the link and release capture
    async fn close(&mut self);
}

/// [`TransportAdapter`] relaying SDP and candidates through the session API
pub struct PeerRelayTransport {
    engine: Arc<dyn PeerEngine>,
    session_api: Arc<dyn SessionApi>,
    options: PeerOptions,
}

impl PeerRelayTransport {
    pub fn new(engine: Arc<dyn PeerEngine>, session_api: Arc<dyn SessionApi>, audio: AudioProcessing) -> Self {
        Self {
            engine,
            session_api,
            options: PeerOptions { audio, video: false },
        }
    }

    async fn negotiate(&self, peer: &mut dyn PeerLink, session_id: &SessionId) -> ClientResult<()> {
        let offer = peer.create_offer().await?;
        debug!(session_id = %session_id, sdp_size = offer.len(), "SDP offer generated");

        let answer = self.session_api.exchange_offer(session_id, &offer).await?;
        peer.apply_answer(&answer).await?;
        debug!(session_id = %session_id, "SDP answer processed");
        Ok(())
    }
}

/// Forward peer signals: candidates to the server, ICE states to the client
async fn pump_signals(
    mut signals: mpsc::UnboundedReceiver<PeerSignal>,
    session_api: Arc<dyn SessionApi>,
    session_id: SessionId,
    events: LinkEventSender,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            PeerSignal::LocalCandidate(candidate) => {
                let api = session_api.clone();
                let session_id = session_id.clone();
                tokio::spawn(async move {
                    api.send_ice_candidate(&session_id, &candidate).await;
                });
            }
            PeerSignal::IceStateChanged(state) => {
                debug!(session_id = %session_id, ice_state = state.as_str(), "ICE state changed");
                if !events.send(LinkEvent::IceStateChanged(state)) {
                    break;
                }
            }
        }
    }
    debug!(session_id = %session_id, "Peer signal pump terminated");
}

#[async_trait]
impl TransportAdapter for PeerRelayTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::PeerRelay
    }

    async fn connect(&self, grant: &SessionGrant, events: LinkEventSender) -> ClientResult<Box<dyn LiveLink>> {
        if grant.credentials != BackendCredentials::PeerRelay {
            return Err(ClientError::configuration(
                "peer-relay transport was handed room credentials",
            ));
        }
        let session_id = grant.session_id.clone();

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let mut peer = self.engine.create_peer(&self.options, signal_tx).await?;
        let pump = tokio::spawn(pump_signals(
            signal_rx,
            self.session_api.clone(),
            session_id.clone(),
            events.clone(),
        ));

        if let Err(e) = self.negotiate(peer.as_mut(), &session_id).await {
            warn!(session_id = %session_id, error = %e, "Peer negotiation failed");
            peer.close().await;
            pump.abort();
            return Err(e);
        }

        info!(session_id = %session_id, "Peer link negotiated");
        events.send(LinkEvent::Negotiated);

        Ok(Box::new(PeerRelayLink {
            session_id,
            peer,
            pump,
        }))
    }
}

struct PeerRelayLink {
    session_id: SessionId,
    peer: Box<dyn PeerLink>,
    pump: JoinHandle<()>,
}

#[async_trait]
impl LiveLink for PeerRelayLink {
    async fn dispose(&mut self) {
        self.peer.close().await;
        self.pump.abort();
        info!(session_id = %self.session_id, "Peer link disposed");
    }
}
