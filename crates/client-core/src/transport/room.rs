//! Room transport
//!
//! Joins a managed room at the server-issued URL with the server-issued token,
//! publishes the microphone, and attaches every subscribed remote audio track
//! to a playback sink supplied by the host.
//!
//! The room library reconnects on its own; only a terminal `Disconnected`
//! reaches the client's reconnection controller.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{BackendKind, LinkEventSender, LiveLink, TransportAdapter};
use crate::client::config::AudioProcessing;
use crate::connection::LinkEvent;
use crate::error::{ClientError, ClientResult};
use crate::session::{BackendCredentials, SessionGrant};

/// Options passed to the room library on connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomOptions {
    pub adaptive_stream: bool,
    pub dynacast: bool,
    pub auto_subscribe: bool,
    pub audio: AudioProcessing,
}

impl RoomOptions {
    pub fn new(audio: AudioProcessing) -> Self {
        Self {
            adaptive_stream: true,
            dynacast: true,
            auto_subscribe: true,
            audio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A remote track publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub sid: String,
    pub kind: TrackKind,
}

/// Events raised by the room library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    Connected,
    Reconnecting,
    Reconnected,
    Disconnected { reason: Option<String> },
    TrackSubscribed { participant_id: String, track: RemoteTrack },
    TrackUnsubscribed { participant_id: String, track: RemoteTrack },
    ConnectionQualityChanged { participant_id: String, quality: String },
    MediaDevicesError { message: String },
}

/// Connects to managed rooms
#[async_trait]
pub trait RoomEngine: Send + Sync {
    /// Join the room at `url` using `token`. Events are reported on `events`.
    async fn connect(
        &self,
        url: &str,
        token: &str,
        options: &RoomOptions,
        events: mpsc::UnboundedSender<RoomEvent>,
    ) -> ClientResult<Box<dyn RoomLink>>;
}

/// A joined room
#[async_trait]
pub trait RoomLink: Send + Sync {
    /// Publish or unpublish the local microphone
    async fn set_microphone_enabled(&mut self, enabled: bool) -> ClientResult<()>;

    /// Leave the room
    async fn disconnect(&mut self);
}

/// Host capability for rendering remote audio
pub trait AudioSinks: Send + Sync {
    /// Start playing `track` from `participant_id`
    fn attach(&self, participant_id: &str, track: &RemoteTrack);

    /// Stop playing `track` from `participant_id`
    fn detach(&self, participant_id: &str, track: &RemoteTrack);
}

/// Sinks currently attached, keyed by track sid
type AttachedSinks = Arc<DashMap<String, (String, RemoteTrack)>>;

/// [`TransportAdapter`] for the managed room backend
pub struct RoomTransport {
    engine: Arc<dyn RoomEngine>,
    sinks: Arc<dyn AudioSinks>,
    options: RoomOptions,
}

impl RoomTransport {
    pub fn new(engine: Arc<dyn RoomEngine>, sinks: Arc<dyn AudioSinks>, audio: AudioProcessing) -> Self {
        Self {
            engine,
            sinks,
            options: RoomOptions::new(audio),
        }
    }
}

async fn pump_room_events(
    mut room_events: mpsc::UnboundedReceiver<RoomEvent>,
    sinks: Arc<dyn AudioSinks>,
    attached: AttachedSinks,
    events: LinkEventSender,
) {
    while let Some(event) = room_events.recv().await {
        let link_event = match event {
            RoomEvent::Connected => LinkEvent::RoomConnected,
            RoomEvent::Reconnecting => LinkEvent::RoomReconnecting,
            RoomEvent::Reconnected => LinkEvent::RoomReconnected,
            RoomEvent::Disconnected { reason } => {
                info!(reason = ?reason, "Room disconnected");
                LinkEvent::RoomDisconnected { reason }
            }
            RoomEvent::TrackSubscribed { participant_id, track } => {
                if track.kind != TrackKind::Audio {
                    debug!(participant_id = %participant_id, track_sid = %track.sid, "Ignoring non-audio track");
                    continue;
                }
                sinks.attach(&participant_id, &track);
                attached.insert(track.sid.clone(), (participant_id.clone(), track));
                LinkEvent::RemoteAudioAttached { participant_id }
            }
            RoomEvent::TrackUnsubscribed { participant_id, track } => {
                if attached.remove(&track.sid).is_none() {
                    continue;
                }
                sinks.detach(&participant_id, &track);
                LinkEvent::RemoteAudioDetached { participant_id }
            }
            RoomEvent::ConnectionQualityChanged { participant_id, quality } => {
                debug!(participant_id = %participant_id, quality = %quality, "Connection quality");
                LinkEvent::ConnectionQuality { participant_id, quality }
            }
            RoomEvent::MediaDevicesError { message } => {
                error!(error = %message, "Media device error");
                LinkEvent::MediaDeviceError { message }
            }
        };

        if !events.send(link_event) {
            break;
        }
    }
    debug!("Room event pump terminated");
}

fn detach_all(sinks: &Arc<dyn AudioSinks>, attached: &AttachedSinks) {
    let sids: Vec<String> = attached.iter().map(|entry| entry.key().clone()).collect();
    for sid in sids {
        if let Some((_, (participant_id, track))) = attached.remove(&sid) {
            sinks.detach(&participant_id, &track);
        }
    }
}

#[async_trait]
impl TransportAdapter for RoomTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::Room
    }

    async fn connect(&self, grant: &SessionGrant, events: LinkEventSender) -> ClientResult<Box<dyn LiveLink>> {
        let (url, token) = match &grant.credentials {
            BackendCredentials::Room { url, token } => (url.as_str(), token.as_str()),
            BackendCredentials::PeerRelay => {
                return Err(ClientError::configuration(
                    "room token or URL not provided by the session API",
                ));
            }
        };

        info!(session_id = %grant.session_id, url = %url, "Connecting to room");
        let (room_tx, room_rx) = mpsc::unbounded_channel();
        let mut room = self.engine.connect(url, token, &self.options, room_tx).await?;

        let attached: AttachedSinks = Arc::new(DashMap::new());
        let pump = tokio::spawn(pump_room_events(
            room_rx,
            self.sinks.clone(),
            attached.clone(),
            events,
        ));

        if let Err(e) = room.set_microphone_enabled(true).await {
            warn!(session_id = %grant.session_id, error = %e, "Failed to publish microphone");
            room.disconnect().await;
            pump.abort();
            detach_all(&self.sinks, &attached);
            return Err(e);
        }
        info!(session_id = %grant.session_id, "Microphone enabled");

        Ok(Box::new(RoomLinkHandle {
            room,
            pump,
            sinks: self.sinks.clone(),
            attached,
        }))
    }
}

struct RoomLinkHandle {
    room: Box<dyn RoomLink>,
    pump: JoinHandle<()>,
    sinks: Arc<dyn AudioSinks>,
    attached: AttachedSinks,
}

#[async_trait]
impl LiveLink for RoomLinkHandle {
    async fn dispose(&mut self) {
        self.room.disconnect().await;
        self.pump.abort();
        detach_all(&self.sinks, &self.attached);
        info!("Disconnected from room");
    }
}
