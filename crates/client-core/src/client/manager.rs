//! The signaling client
//!
//! [`SignalingClient`] owns at most one session and one live link at a time.
//! It drives the session API and the transport, normalizes every lifecycle
//! signal into a [`ConnectionState`], and runs the bounded reconnection loop
//! when a link fails.
//!
//! # Concurrency model
//!
//! - Every link is created with a fresh *generation*. Link events carry the
//!   generation they were produced under and anything older than the current
//!   one is discarded, so a retired link can never move the state machine.
//! - Every `start()`/`stop()` opens a new *lifecycle*. A reconnection loop
//!   remembers the lifecycle it was spawned in and quits as soon as that
//!   lifecycle is over.
//! - The retry state holds the only reconnection guard. A failure signal while
//!   a loop is running is recorded against its generation; if it came from
//!   the link the running attempt just built, that attempt counts as failed.
//!   After the loop gave up, failure signals are ignored.
//! - While a loop is running, the link it is building cannot reset the attempt
//!   counter or report `connected`. Only the attempt's result does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::config::ClientConfig;
use super::recovery::{with_timeout, ReconnectPhase, RetryState};
use super::types::ClientStatus;
use crate::connection::{observe, ConnectionState, LinkEvent, MessageKind};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, ClientEventHandler, EventDispatcher};
use crate::session::{SessionApi, SessionId};
use crate::transport::{LinkEventSender, LiveLink, TaggedLinkEvent, TransportAdapter};

/// Session and link currently owned by the client
#[derive(Default)]
struct LinkSlot {
    session: Option<SessionId>,
    transport: Option<Box<dyn LiveLink>>,
}

/// Last state reported to the host
struct StatusCell {
    state: ConnectionState,
    text: String,
    /// Bumped on every state change
    seq: u64,
}

/// Voice-call signaling client
pub struct SignalingClient {
    config: ClientConfig,
    session_api: Arc<dyn SessionApi>,
    adapter: Arc<dyn TransportAdapter>,
    events: Arc<EventDispatcher>,

    link: Mutex<LinkSlot>,
    status: SyncMutex<StatusCell>,
    retry: SyncMutex<RetryState>,

    generation: AtomicU64,
    lifecycle: AtomicU64,
    link_tx: mpsc::UnboundedSender<TaggedLinkEvent>,
}

impl std::fmt::Debug for SignalingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingClient")
            .field("backend", &self.config.backend)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("retry", &*self.retry.lock())
            .finish()
    }
}

impl SignalingClient {
    pub(crate) fn new(
        config: ClientConfig,
        session_api: Arc<dyn SessionApi>,
        adapter: Arc<dyn TransportAdapter>,
        events: Arc<EventDispatcher>,
    ) -> Arc<Self> {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            config,
            session_api,
            adapter,
            events,
            link: Mutex::new(LinkSlot::default()),
            status: SyncMutex::new(StatusCell {
                state: ConnectionState::Idle,
                text: "Not connected".to_string(),
                seq: 0,
            }),
            retry: SyncMutex::new(RetryState::default()),
            generation: AtomicU64::new(0),
            lifecycle: AtomicU64::new(0),
            link_tx,
        });

        tokio::spawn(Self::pump_link_events(Arc::downgrade(&client), link_rx));
        client
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Receive every event the client emits
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Register the host-side event handler, replacing any previous one
    pub async fn set_event_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        self.events.set_handler(handler).await;
    }

    /// Start a call: create a session and establish the link
    ///
    /// Any session still held is closed first. Errors are returned to the
    /// caller and never trigger automatic reconnection.
    pub async fn start(&self) -> ClientResult<()> {
        let lifecycle = {
            let mut retry = self.retry.lock();
            retry.clear();
            self.lifecycle.fetch_add(1, Ordering::SeqCst) + 1
        };
        info!(backend = %self.config.backend, lifecycle, "Starting session");

        self.retire_link().await;
        self.announce(ConnectionState::Connecting, "Creating session...").await;

        match self.establish().await {
            Ok((session_id, _)) => {
                info!(session_id = %session_id, "Session established");
                // The link may already have failed and handed over to reconnection
                let reconnecting = self.retry.lock().is_reconnecting;
                if !reconnecting {
                    self.transition(ConnectionState::Connected, "Call established").await;
                }
                Ok(())
            }
            Err(ClientError::Cancelled) => {
                debug!(lifecycle, "Start superseded");
                Err(ClientError::Cancelled)
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "Failed to start session");
                self.announce(ConnectionState::Failed, format!("Start failed: {}", e)).await;
                Err(e)
            }
        }
    }

    /// End the call and release every resource
    ///
    /// Cancels a running reconnection, disposes the link and deletes the
    /// session on the server. Never fails.
    pub async fn stop(&self) {
        {
            let mut retry = self.retry.lock();
            self.lifecycle.fetch_add(1, Ordering::SeqCst);
            retry.clear();
        }
        info!("Stopping session");

        self.retire_link().await;
        self.announce(ConnectionState::Disconnected, "Not connected").await;
        self.events.message(MessageKind::System, "Session closed").await;
    }

    /// True iff both a session and a live link are held
    pub async fn is_active(&self) -> bool {
        let slot = self.link.lock().await;
        slot.session.is_some() && slot.transport.is_some()
    }

    /// Last state reported to the host
    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub fn retry_state(&self) -> RetryState {
        *self.retry.lock()
    }

    pub fn reconnect_phase(&self) -> ReconnectPhase {
        self.retry.lock().phase
    }

    /// Snapshot of the client
    pub async fn status(&self) -> ClientStatus {
        let (session_id, is_active) = {
            let slot = self.link.lock().await;
            (slot.session.clone(), slot.session.is_some() && slot.transport.is_some())
        };
        let (state, text) = {
            let status = self.status.lock();
            (status.state, status.text.clone())
        };
        let retry = self.retry_state();

        ClientStatus {
            backend: self.config.backend,
            state,
            text,
            session_id,
            is_active,
            reconnect_phase: retry.phase,
            attempt_count: retry.attempt_count,
            max_attempts: self.config.retry.max_attempts,
        }
    }

    fn is_cancelled(&self, lifecycle: u64) -> bool {
        self.lifecycle.load(Ordering::SeqCst) != lifecycle
    }

    /// Report a status unconditionally
    async fn announce(&self, state: ConnectionState, text: impl Into<String>) {
        let text = text.into();
        {
            let mut status = self.status.lock();
            if status.state != state {
                status.seq += 1;
            }
            status.state = state;
            status.text = text.clone();
        }
        self.events.status(state, text).await;
    }

    /// Report a status only if the state actually changes
    async fn transition(&self, state: ConnectionState, text: impl Into<String>) {
        let text = text.into();
        let changed = {
            let mut status = self.status.lock();
            if status.state == state {
                false
            } else {
                status.state = state;
                status.text = text.clone();
                status.seq += 1;
                true
            }
        };
        if changed {
            self.events.status(state, text).await;
        }
    }

    /// Create a session and bring up its link under a new generation
    async fn establish(&self) -> ClientResult<(SessionId, u64)> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let user_id = self.config.next_user_id();
        debug!(generation, user_id = %user_id, "Creating session");

        let grant = self.session_api.create_session(&user_id).await?;
        let session_id = grant.session_id.clone();

        let stashed = {
            let mut slot = self.link.lock().await;
            if self.generation.load(Ordering::SeqCst) == generation {
                slot.session = Some(session_id.clone());
                true
            } else {
                false
            }
        };
        if !stashed {
            debug!(session_id = %session_id, "Session superseded before the link was built");
            self.session_api.delete_session(&session_id).await;
            return Err(ClientError::Cancelled);
        }

        let sender = LinkEventSender::new(generation, self.link_tx.clone());
        let connected = with_timeout(
            "transport connect",
            self.config.connect_timeout,
            self.adapter.connect(&grant, sender),
        )
        .await;

        let link = match connected {
            Ok(link) => link,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Transport setup failed");
                self.abandon_session(generation, &session_id).await;
                return Err(e);
            }
        };

        let rejected = {
            let mut slot = self.link.lock().await;
            if self.generation.load(Ordering::SeqCst) == generation {
                slot.transport = Some(link);
                None
            } else {
                Some(link)
            }
        };
        if let Some(mut link) = rejected {
            // The session was taken by whoever retired this generation
            debug!(session_id = %session_id, "Link superseded, disposing");
            link.dispose().await;
            return Err(ClientError::Cancelled);
        }

        Ok((session_id, generation))
    }

    /// Retire a generation whose link never came up and delete its session
    async fn abandon_session(&self, generation: u64, session_id: &SessionId) {
        let owned = {
            let mut slot = self.link.lock().await;
            let retired = self
                .generation
                .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if retired && slot.session.as_ref() == Some(session_id) {
                slot.session.take()
            } else {
                None
            }
        };
        if let Some(id) = owned {
            self.session_api.delete_session(&id).await;
        }
    }

    /// Retire `generation` if it is still current, disposing its link and session
    async fn retire_generation(&self, generation: u64) {
        let (transport, session) = {
            let mut slot = self.link.lock().await;
            let retired = self
                .generation
                .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if !retired {
                return;
            }
            (slot.transport.take(), slot.session.take())
        };

        if let Some(mut transport) = transport {
            transport.dispose().await;
        }
        if let Some(session_id) = session {
            self.session_api.delete_session(&session_id).await;
        }
    }

    /// Dispose the current link and delete its session, best-effort
    async fn retire_link(&self) {
        let (transport, session) = {
            let mut slot = self.link.lock().await;
            self.generation.fetch_add(1, Ordering::SeqCst);
            (slot.transport.take(), slot.session.take())
        };

        if let Some(mut transport) = transport {
            transport.dispose().await;
        }
        if let Some(session_id) = session {
            debug!(session_id = %session_id, "Deleting session");
            self.session_api.delete_session(&session_id).await;
        }
    }

    async fn pump_link_events(client: Weak<Self>, mut link_rx: mpsc::UnboundedReceiver<TaggedLinkEvent>) {
        while let Some(tagged) = link_rx.recv().await {
            let Some(client) = client.upgrade() else {
                break;
            };
            client.handle_link_event(tagged).await;
        }
        debug!("Link event pump terminated");
    }

    async fn handle_link_event(self: &Arc<Self>, tagged: TaggedLinkEvent) {
        let current = self.generation.load(Ordering::SeqCst);
        if tagged.generation != current {
            debug!(
                event_generation = tagged.generation,
                current_generation = current,
                event = ?tagged.event,
                "Dropping event from retired link"
            );
            return;
        }

        let observation = observe(&tagged.event);

        if let Some(raw) = observation.raw {
            self.events.connection_state(raw).await;
        }
        let reconnecting = {
            let mut retry = self.retry.lock();
            if observation.reset_retry && !retry.is_reconnecting && retry.reset_attempts() {
                debug!("Connection established, retry count reset");
            }
            retry.is_reconnecting
        };
        if let Some((state, text)) = observation.state {
            if reconnecting && state == ConnectionState::Connected {
                debug!(generation = tagged.generation, "Link up, waiting for the reconnection attempt to finish");
            } else {
                self.transition(state, text).await;
            }
        }
        if let Some((kind, payload)) = observation.message {
            self.events.message(kind, payload).await;
        }

        if observation.escalate {
            self.handle_connection_failure(tagged.generation, describe(&tagged.event));
        } else if observation.may_recover {
            self.watch_disconnect(tagged.generation);
        }
    }

    /// Start the reconnection loop unless one is running or has given up
    ///
    /// A failure reported while a loop runs is kept for that loop to check
    /// against the link its current attempt built.
    fn handle_connection_failure(self: &Arc<Self>, generation: u64, reason: String) {
        let lifecycle = {
            let mut retry = self.retry.lock();
            if retry.is_reconnecting {
                debug!(generation, reason = %reason, "Reconnection already running, failure recorded");
                retry.pending_failure = Some(generation);
                return;
            }
            if retry.phase == ReconnectPhase::Exhausted {
                debug!(reason = %reason, "Reconnection exhausted, waiting for restart");
                return;
            }
            retry.is_reconnecting = true;
            retry.phase = ReconnectPhase::Attempting;
            self.lifecycle.load(Ordering::SeqCst)
        };

        warn!(reason = %reason, "Connection failure, starting reconnection");
        let client = Arc::clone(self);
        tokio::spawn(async move {
            client.run_reconnection(lifecycle).await;
        });
    }

    /// Escalate a peer-relay link that stays disconnected for the grace period
    fn watch_disconnect(self: &Arc<Self>, generation: u64) {
        let Some(grace) = self.config.disconnect_grace else {
            return;
        };
        if self.adapter.backend().recovers_natively() {
            return;
        }

        let seq = self.status.lock().seq;
        let client = Arc::clone(self);
        tokio::spawn(async move {
            sleep(grace).await;
            let still_down = client.generation.load(Ordering::SeqCst) == generation && {
                let status = client.status.lock();
                status.seq == seq && status.state == ConnectionState::Disconnected
            };
            if still_down {
                warn!(grace_ms = grace.as_millis() as u64, "Link stayed disconnected");
                client.handle_connection_failure(generation, "link stayed disconnected".to_string());
            }
        });
    }

    async fn run_reconnection(self: Arc<Self>, lifecycle: u64) {
        let max_attempts = self.config.retry.max_attempts;

        loop {
            let attempt = {
                let mut retry = self.retry.lock();
                if self.is_cancelled(lifecycle) {
                    return;
                }
                if retry.attempt_count >= max_attempts {
                    break;
                }
                retry.attempt_count += 1;
                retry.attempt_count
            };

            let delay = self.config.retry.delay_for_attempt(attempt);
            info!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnection attempt"
            );
            self.announce(
                ConnectionState::Reconnecting,
                format!("Reconnecting... ({}/{})", attempt, max_attempts),
            )
            .await;

            sleep(delay).await;
            if self.is_cancelled(lifecycle) {
                debug!(attempt, "Reconnection cancelled");
                return;
            }

            self.retire_link().await;
            match self.establish().await {
                Ok((session_id, generation)) => {
                    let link_failed = {
                        let mut retry = self.retry.lock();
                        if self.is_cancelled(lifecycle) {
                            return;
                        }
                        let link_failed = retry.pending_failure.take() == Some(generation);
                        if !link_failed {
                            retry.clear();
                        }
                        link_failed
                    };
                    if link_failed {
                        warn!(attempt, session_id = %session_id, "Link failed before the attempt completed");
                        self.retire_generation(generation).await;
                        continue;
                    }
                    info!(session_id = %session_id, attempt, "Reconnection successful");
                    self.announce(ConnectionState::Connected, "Reconnected").await;
                    self.events.message(MessageKind::System, "Reconnected").await;
                    return;
                }
                Err(ClientError::Cancelled) => {
                    debug!(attempt, "Reconnection attempt superseded");
                    return;
                }
                Err(e) if !e.is_recoverable() => {
                    error!(attempt, error = %e, category = e.category(), "Reconnection aborted");
                    self.exhaust(lifecycle, format!("Reconnection aborted: {}", e)).await;
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, category = e.category(), "Reconnection attempt failed");
                }
            }
        }

        error!(max_attempts, "Reconnection attempts exhausted");
        self.exhaust(lifecycle, format!("Connection failed after {} attempts", max_attempts))
            .await;
    }

    /// Give up reconnecting until the next `start()`
    async fn exhaust(&self, lifecycle: u64, text: String) {
        {
            let mut retry = self.retry.lock();
            if self.is_cancelled(lifecycle) {
                return;
            }
            retry.is_reconnecting = false;
            retry.phase = ReconnectPhase::Exhausted;
        }
        self.announce(ConnectionState::Failed, text).await;
        self.events
            .message(MessageKind::System, "Connection could not be restored, please restart the session")
            .await;
    }
}

fn describe(event: &LinkEvent) -> String {
    match event {
        LinkEvent::IceStateChanged(state) => format!("ICE {}", state.as_str()),
        LinkEvent::RoomDisconnected { reason: Some(reason) } => format!("room disconnected: {}", reason),
        LinkEvent::RoomDisconnected { reason: None } => "room disconnected".to_string(),
        other => format!("{:?}", other),
    }
}
