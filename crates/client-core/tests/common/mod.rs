//! Shared fakes for integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use skylark_client_core::transport::{
    AudioSinks, PeerEngine, PeerLink, PeerOptions, PeerSignal, RemoteTrack, RoomEngine, RoomEvent, RoomLink,
    RoomOptions,
};
use skylark_client_core::{
    BackendCredentials, BackendKind, ClientError, ClientEvent, ClientResult, IceCandidate, IceConnectionState, LinkEvent,
    LinkEventSender, LiveLink, SessionApi, SessionGrant, SessionId, StatusInfo, TransportAdapter,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("skylark_client_core=debug")
        .with_test_writer()
        .try_init();
}

/// Let spawned tasks run without moving the paused clock
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Wait for a status matching `pred`, collecting everything seen on the way
pub async fn wait_for_status(
    rx: &mut broadcast::Receiver<ClientEvent>,
    seen: &mut Vec<StatusInfo>,
    pred: impl Fn(&StatusInfo) -> bool,
) -> StatusInfo {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(ClientEvent::StatusChanged(info)) => {
                    seen.push(info.clone());
                    if pred(&info) {
                        return info;
                    }
                }
                Ok(_) => {}
                Err(e) => panic!("event channel failed: {}", e),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(300), wait)
        .await
        .expect("status never arrived")
}

/// Drain events already queued
pub fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn status_texts(events: &[ClientEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::StatusChanged(info) => Some(format!("{}:{}", info.state, info.text)),
            _ => None,
        })
        .collect()
}

/// In-memory session API with scripted failures
pub struct FakeSessionApi {
    backend: BackendKind,
    next_id: AtomicU32,
    pub creates: AtomicU32,
    pub create_times: Mutex<Vec<Instant>>,
    pub deleted: Mutex<Vec<SessionId>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    scripted_failures: Mutex<VecDeque<ClientError>>,
    persistent_failure: Mutex<Option<ClientError>>,
    create_delay_ms: AtomicU64,
}

impl FakeSessionApi {
    pub fn new(backend: BackendKind) -> Arc<Self> {
        Arc::new(Self {
            backend,
            next_id: AtomicU32::new(0),
            creates: AtomicU32::new(0),
            create_times: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            scripted_failures: Mutex::new(VecDeque::new()),
            persistent_failure: Mutex::new(None),
            create_delay_ms: AtomicU64::new(0),
        })
    }

    /// Make every create call take `delay` before answering
    pub fn delay_creates(&self, delay: Duration) {
        self.create_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail the next create call with `error`
    pub fn fail_next_create(&self, error: ClientError) {
        self.scripted_failures.lock().push_back(error);
    }

    /// Fail every create call until cleared
    pub fn fail_all_creates(&self, error: ClientError) {
        *self.persistent_failure.lock() = Some(error);
    }

    pub fn clear_failures(&self) {
        self.scripted_failures.lock().clear();
        *self.persistent_failure.lock() = None;
    }

    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().iter().map(|id| id.to_string()).collect()
    }
}

#[async_trait]
impl SessionApi for FakeSessionApi {
    async fn create_session(&self, user_id: &str) -> ClientResult<SessionGrant> {
        assert!(user_id.starts_with("user-"), "unexpected user id {}", user_id);
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.create_times.lock().push(Instant::now());

        let delay_ms = self.create_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Err(error);
        }
        if let Some(error) = self.persistent_failure.lock().clone() {
            return Err(error);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let credentials = match self.backend {
            BackendKind::PeerRelay => BackendCredentials::PeerRelay,
            BackendKind::Room => BackendCredentials::Room {
                url: "wss://sfu.test".to_string(),
                token: format!("token-{}", n),
            },
        };
        Ok(SessionGrant {
            session_id: SessionId(format!("session-{}", n)),
            credentials,
        })
    }

    async fn exchange_offer(&self, _session_id: &SessionId, _sdp_offer: &str) -> ClientResult<String> {
        Ok("answer-sdp".to_string())
    }

    async fn send_ice_candidate(&self, _session_id: &SessionId, candidate: &IceCandidate) {
        self.candidates.lock().push(candidate.clone());
    }

    async fn delete_session(&self, session_id: &SessionId) {
        self.deleted.lock().push(session_id.clone());
    }
}

/// Transport that hands out inert links and keeps every event sender
pub struct FakeAdapter {
    backend: BackendKind,
    on_connect: Option<LinkEvent>,
    pub connects: AtomicU32,
    pub disposed: Arc<AtomicU32>,
    senders: Mutex<Vec<LinkEventSender>>,
    connect_delay_ms: AtomicU64,
    failing_connects: Mutex<Vec<u32>>,
}

impl FakeAdapter {
    /// Adapter reporting `Negotiated` as soon as a link is up
    pub fn peer_relay() -> Arc<Self> {
        Arc::new(Self {
            backend: BackendKind::PeerRelay,
            on_connect: Some(LinkEvent::Negotiated),
            connects: AtomicU32::new(0),
            disposed: Arc::new(AtomicU32::new(0)),
            senders: Mutex::new(Vec::new()),
            connect_delay_ms: AtomicU64::new(0),
            failing_connects: Mutex::new(Vec::new()),
        })
    }

    /// Make every connect take `delay` before the link comes up
    pub fn delay_connects(&self, delay: Duration) {
        self.connect_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Connect number `n` (1-based) reports ICE failure before it returns
    pub fn fail_link_during_connect(&self, n: u32) {
        self.failing_connects.lock().push(n);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> u32 {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Sender of the most recent link
    pub fn current_sender(&self) -> LinkEventSender {
        self.senders.lock().last().cloned().expect("no link was created")
    }

    /// Report `event` on the most recent link
    pub fn emit(&self, event: LinkEvent) {
        self.current_sender().send(event);
    }
}

#[async_trait]
impl TransportAdapter for FakeAdapter {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn connect(&self, _grant: &SessionGrant, events: LinkEventSender) -> ClientResult<Box<dyn LiveLink>> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let delay_ms = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if let Some(event) = &self.on_connect {
            events.send(event.clone());
        }
        let fails = self.failing_connects.lock().contains(&n);
        if fails {
            events.send(LinkEvent::IceStateChanged(IceConnectionState::Failed));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.senders.lock().push(events);
        Ok(Box::new(FakeLink {
            disposed: self.disposed.clone(),
        }))
    }
}

struct FakeLink {
    disposed: Arc<AtomicU32>,
}

#[async_trait]
impl LiveLink for FakeLink {
    async fn dispose(&mut self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Peer primitive that announces scripted candidates while building the offer
pub struct FakePeerEngine {
    signals: Mutex<Option<mpsc::UnboundedSender<PeerSignal>>>,
    candidates: Vec<IceCandidate>,
    pub options: Mutex<Option<PeerOptions>>,
    pub answers: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicU32>,
}

impl FakePeerEngine {
    pub fn new(candidates: Vec<IceCandidate>) -> Arc<Self> {
        Arc::new(Self {
            signals: Mutex::new(None),
            candidates,
            options: Mutex::new(None),
            answers: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn signal(&self, signal: PeerSignal) {
        if let Some(tx) = self.signals.lock().as_ref() {
            let _ = tx.send(signal);
        }
    }

    pub fn closed(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerEngine for FakePeerEngine {
    async fn create_peer(
        &self,
        options: &PeerOptions,
        signals: mpsc::UnboundedSender<PeerSignal>,
    ) -> ClientResult<Box<dyn PeerLink>> {
        *self.options.lock() = Some(options.clone());
        *self.signals.lock() = Some(signals.clone());
        Ok(Box::new(FakePeer {
            signals,
            candidates: self.candidates.clone(),
            answers: self.answers.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakePeer {
    signals: mpsc::UnboundedSender<PeerSignal>,
    candidates: Vec<IceCandidate>,
    answers: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicU32>,
}

#[async_trait]
impl PeerLink for FakePeer {
    async fn create_offer(&mut self) -> ClientResult<String> {
        for candidate in &self.candidates {
            let _ = self.signals.send(PeerSignal::LocalCandidate(candidate.clone()));
        }
        Ok("offer-sdp".to_string())
    }

    async fn apply_answer(&mut self, sdp_answer: &str) -> ClientResult<()> {
        self.answers.lock().push(sdp_answer.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Room primitive driven by the test
pub struct FakeRoomEngine {
    events: Mutex<Option<mpsc::UnboundedSender<RoomEvent>>>,
    pub joined: Mutex<Vec<(String, String)>>,
    pub options: Mutex<Option<RoomOptions>>,
    pub microphone: Arc<Mutex<Vec<bool>>>,
    pub disconnects: Arc<AtomicU32>,
    pub fail_microphone: Arc<AtomicBool>,
    pub microphone_delay_ms: Arc<AtomicU64>,
}

impl FakeRoomEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(None),
            joined: Mutex::new(Vec::new()),
            options: Mutex::new(None),
            microphone: Arc::new(Mutex::new(Vec::new())),
            disconnects: Arc::new(AtomicU32::new(0)),
            fail_microphone: Arc::new(AtomicBool::new(false)),
            microphone_delay_ms: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Raise `event` on the most recently joined room
    pub fn emit(&self, event: RoomEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn joins(&self) -> usize {
        self.joined.lock().len()
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoomEngine for FakeRoomEngine {
    async fn connect(
        &self,
        url: &str,
        token: &str,
        options: &RoomOptions,
        events: mpsc::UnboundedSender<RoomEvent>,
    ) -> ClientResult<Box<dyn RoomLink>> {
        self.joined.lock().push((url.to_string(), token.to_string()));
        *self.options.lock() = Some(options.clone());
        let _ = events.send(RoomEvent::Connected);
        *self.events.lock() = Some(events);
        Ok(Box::new(FakeRoom {
            microphone: self.microphone.clone(),
            disconnects: self.disconnects.clone(),
            fail_microphone: self.fail_microphone.clone(),
            microphone_delay_ms: self.microphone_delay_ms.clone(),
        }))
    }
}

struct FakeRoom {
    microphone: Arc<Mutex<Vec<bool>>>,
    disconnects: Arc<AtomicU32>,
    fail_microphone: Arc<AtomicBool>,
    microphone_delay_ms: Arc<AtomicU64>,
}

#[async_trait]
impl RoomLink for FakeRoom {
    async fn set_microphone_enabled(&mut self, enabled: bool) -> ClientResult<()> {
        let delay_ms = self.microphone_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_microphone.load(Ordering::SeqCst) {
            return Err(ClientError::transport_setup("microphone permission denied"));
        }
        self.microphone.lock().push(enabled);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Playback sinks recording attach/detach calls
#[derive(Default)]
pub struct RecordingSinks {
    pub log: Mutex<Vec<String>>,
}

impl RecordingSinks {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl AudioSinks for RecordingSinks {
    fn attach(&self, participant_id: &str, track: &RemoteTrack) {
        self.log.lock().push(format!("attach:{}:{}", participant_id, track.sid));
    }

    fn detach(&self, participant_id: &str, track: &RemoteTrack) {
        self.log.lock().push(format!("detach:{}:{}", participant_id, track.sid));
    }
}
