//! Session coordinator
//!
//! Ties the signaling port, the media controller and the peer registry
//! together into one multi-party session. The coordinator owns the session
//! lifecycle (join/leave), reacts to signaling and transport events, and
//! schedules bounded connection restarts after failures.

use crate::channels::ControlMessage;
use crate::config::EngineConfig;
use crate::events::EngineEvent;
use crate::media::{LocalMediaController, MediaConstraints, MediaSource, MediaState};
use crate::peer::{
    BackendEvent, PeerBackendFactory, PeerConnectionRegistry, PeerConnectionState,
};
use crate::signaling::{SignalEvent, SignalMessage, SignalPayload, SignalingPort};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Where the local participant is in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Joining,
    Joined,
    Leaving,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Joining => "joining",
            SessionPhase::Joined => "joined",
            SessionPhase::Leaving => "leaving",
        }
    }
}

/// Coordinator for one local participant's session membership
pub struct SessionCoordinator {
    user_id: String,
    config: EngineConfig,
    signaling: Arc<dyn SignalingPort>,
    media: LocalMediaController,
    registry: PeerConnectionRegistry,
    phase: RwLock<SessionPhase>,
    session_id: RwLock<Option<String>>,
    /// Peers that announced themselves while our own join was in flight
    pending_joiners: Mutex<Vec<String>>,
    restart_attempts: Mutex<HashMap<String, u32>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    weak: Weak<SessionCoordinator>,
}

impl SessionCoordinator {
    /// Build a coordinator and the event stream the application consumes
    pub fn new(
        user_id: impl Into<String>,
        config: EngineConfig,
        signaling: Arc<dyn SignalingPort>,
        source: Arc<dyn MediaSource>,
        factory: Arc<dyn PeerBackendFactory>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();

        let coordinator = Arc::new_cyclic(|weak: &Weak<SessionCoordinator>| Self {
            user_id: user_id.into(),
            config,
            signaling,
            media: LocalMediaController::new(source),
            registry: PeerConnectionRegistry::new(factory, backend_tx, events_tx.clone()),
            phase: RwLock::new(SessionPhase::Idle),
            session_id: RwLock::new(None),
            pending_joiners: Mutex::new(Vec::new()),
            restart_attempts: Mutex::new(HashMap::new()),
            events: events_tx,
            weak: weak.clone(),
        });

        Self::spawn_backend_pump(Arc::downgrade(&coordinator), backend_rx);
        (coordinator, events_rx)
    }

    /// Drain backend events for as long as the coordinator is alive
    fn spawn_backend_pump(
        weak: Weak<SessionCoordinator>,
        mut backend_rx: mpsc::UnboundedReceiver<BackendEvent>,
    ) {
        tokio::spawn(async move {
            while let Some(event) = backend_rx.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.handle_backend_event(event).await;
            }
            debug!("Backend event pump stopped");
        });
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn phase(&self) -> SessionPhase {
        *self.phase.read().await
    }

    /// The local media flags as currently announced to peers
    pub async fn media_state(&self) -> MediaState {
        self.media.media_state().await
    }

    pub async fn connected_peers(&self) -> Vec<String> {
        self.registry.peer_ids().await
    }

    /// Identifier of the session currently joined, if any
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Media flags last announced by a known peer
    pub async fn remote_media_state(&self, user_id: &str) -> Option<MediaState> {
        self.registry.remote_media(user_id).await
    }

    /// Join a session: acquire media, open signaling, offer to everyone present
    ///
    /// Media acquisition and signaling open are terminal for the join; a
    /// failed offer to an individual peer is not and leaves the rest of the
    /// mesh intact.
    pub async fn join(&self, session_id: &str, constraints: MediaConstraints) -> Result<()> {
        {
            let mut phase = self.phase.write().await;
            if *phase != SessionPhase::Idle {
                return Err(Error::AlreadyJoined(format!(
                    "cannot join {} while {}",
                    session_id,
                    phase.as_str()
                )));
            }
            *phase = SessionPhase::Joining;
        }

        info!("Joining session {} as {}", session_id, self.user_id);

        let stream = match self.media.acquire(&constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.phase.write().await = SessionPhase::Idle;
                return Err(e);
            }
        };

        let roster = match self.signaling.open(session_id, &self.user_id).await {
            Ok(roster) => roster,
            Err(e) => {
                self.media.release().await;
                *self.phase.write().await = SessionPhase::Idle;
                return Err(e);
            }
        };

        *self.session_id.write().await = Some(session_id.to_string());
        self.emit(EngineEvent::LocalStreamUpdated {
            stream: stream.clone(),
        });
        self.send_signal(SignalMessage::broadcast(SignalPayload::Join))
            .await;

        for peer in roster {
            if peer == self.user_id {
                continue;
            }
            self.offer_if_absent(&peer).await;
        }

        *self.phase.write().await = SessionPhase::Joined;

        // Peers that joined while we were still joining get offers now
        let joiners = std::mem::take(&mut *self.pending_joiners.lock().await);
        for peer in joiners {
            self.offer_if_absent(&peer).await;
        }

        info!("Joined session {}", session_id);
        Ok(())
    }

    /// Leave the session and tear everything down. Idempotent.
    pub async fn leave(&self) -> Result<()> {
        {
            let mut phase = self.phase.write().await;
            if *phase == SessionPhase::Idle {
                return Ok(());
            }
            *phase = SessionPhase::Leaving;
        }

        info!("Leaving session as {}", self.user_id);
        self.send_signal(SignalMessage::broadcast(SignalPayload::Leave))
            .await;
        self.registry.close_all().await;
        self.media.release().await;
        if let Err(e) = self.signaling.close().await {
            warn!("Error closing signaling: {}", e);
        }

        *self.session_id.write().await = None;
        self.pending_joiners.lock().await.clear();
        self.restart_attempts.lock().await.clear();
        *self.phase.write().await = SessionPhase::Idle;
        Ok(())
    }

    /// Feed one inbound signaling event into the engine
    ///
    /// Never fails: malformed or out-of-place messages are logged and
    /// dropped so one bad peer cannot wedge the session.
    pub async fn handle_signal(&self, event: SignalEvent) {
        if event.user_id() == self.user_id {
            return;
        }
        debug!("Signal {} from {}", event.name(), event.user_id());

        match event {
            SignalEvent::UserJoined { user_id } => self.handle_user_joined(user_id).await,
            SignalEvent::UserLeft { user_id } => self.handle_user_left(&user_id).await,
            SignalEvent::Offer {
                user_id,
                description,
            } => {
                if let Err(e) = self.answer_to(&user_id, description).await {
                    warn!("Failed to answer offer from peer {}: {}", user_id, e);
                }
            }
            SignalEvent::Answer {
                user_id,
                description,
            } => {
                if let Err(e) = self.registry.apply_answer(&user_id, description).await {
                    warn!("Dropping answer from peer {}: {}", user_id, e);
                }
            }
            SignalEvent::IceCandidate { user_id, candidate } => {
                if let Err(e) = self
                    .registry
                    .enqueue_or_apply_candidate(&user_id, candidate)
                    .await
                {
                    warn!("Dropping candidate from peer {}: {}", user_id, e);
                }
            }
            SignalEvent::Control { user_id, payload } => {
                match serde_json::from_value::<ControlMessage>(payload) {
                    Ok(message) => self.apply_control(&user_id, message).await,
                    Err(e) => warn!("Dropping control signal from peer {}: {}", user_id, e),
                }
            }
        }
    }

    async fn handle_user_joined(&self, user_id: String) {
        match self.phase().await {
            SessionPhase::Joined => {
                self.offer_if_absent(&user_id).await;
            }
            SessionPhase::Joining => {
                debug!("Deferring offer to {} until join completes", user_id);
                self.pending_joiners.lock().await.push(user_id);
            }
            phase => debug!("Ignoring join of {} while {}", user_id, phase.as_str()),
        }
    }

    async fn handle_user_left(&self, user_id: &str) {
        self.restart_attempts.lock().await.remove(user_id);
        if self.registry.close(user_id).await {
            info!("Peer {} left the session", user_id);
            self.emit(EngineEvent::peer_disconnected(user_id));
        }
    }

    /// Flip the local audio flag and announce the new state to all peers
    pub async fn toggle_audio(&self) -> Result<bool> {
        let enabled = self.media.toggle_audio().await?;
        self.broadcast_media_state().await;
        Ok(enabled)
    }

    /// Flip the local video flag and announce the new state to all peers
    pub async fn toggle_video(&self) -> Result<bool> {
        let enabled = self.media.toggle_video().await?;
        self.broadcast_media_state().await;
        Ok(enabled)
    }

    /// Swap the outgoing video source to a screen capture track
    ///
    /// Uses in-place track replacement on every live connection; no
    /// offer/answer cycle happens. Auto-reverts to the camera when the
    /// screen track ends from outside (e.g. the OS capture picker stops it).
    pub async fn start_screen_share(&self) -> Result<()> {
        let track = self.media.start_screen_share().await?;
        self.registry
            .replace_outgoing_track(Arc::clone(&track))
            .await;
        self.broadcast_media_state().await;
        self.emit_local_stream().await;

        let weak = self.weak.clone();
        let mut ended = track.ended();
        tokio::spawn(async move {
            if ended.changed().await.is_err() || !*ended.borrow() {
                return;
            }
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            if coordinator.media.is_screen_sharing().await {
                info!("Screen track ended; reverting to camera");
                if let Err(e) = coordinator.stop_screen_share().await {
                    warn!("Failed to revert to camera: {}", e);
                }
            }
        });
        Ok(())
    }

    /// Revert the outgoing video source to the camera. Idempotent.
    pub async fn stop_screen_share(&self) -> Result<()> {
        let camera = self.media.revert_to_camera().await?;
        self.registry.replace_outgoing_track(camera).await;
        self.broadcast_media_state().await;
        self.emit_local_stream().await;
        Ok(())
    }

    /// Send an application-defined control payload to one peer or everyone
    pub async fn send_custom_control(
        &self,
        target: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.registry
            .send_control(target, &ControlMessage::Custom { payload })
            .await
    }

    async fn handle_backend_event(&self, event: BackendEvent) {
        debug!("Transport event for peer {}", event.user_id());
        match event {
            BackendEvent::LocalCandidate { user_id, candidate } => {
                self.send_signal(SignalMessage::to_peer(
                    &user_id,
                    SignalPayload::IceCandidate { candidate },
                ))
                .await;
            }
            BackendEvent::TransportState { user_id, state } => {
                match self.registry.on_transport_state(&user_id, state).await {
                    Some(PeerConnectionState::Connected) => {
                        self.restart_attempts.lock().await.remove(&user_id);
                    }
                    Some(PeerConnectionState::Failed) => {
                        self.handle_peer_failed(&user_id).await;
                    }
                    _ => {}
                }
            }
            BackendEvent::RemoteTrack {
                user_id,
                stream_id,
                track_id,
                kind,
            } => {
                self.registry
                    .on_remote_track(&user_id, &stream_id, &track_id, kind)
                    .await;
            }
            BackendEvent::ChannelOpen { user_id } => {
                // Announce our full media state on every channel open so a
                // reconnected peer does not keep stale flags
                debug!("Control channel open to peer {}", user_id);
                let message = ControlMessage::media_state(self.media.media_state().await);
                if let Err(e) = self.registry.send_control(Some(&user_id), &message).await {
                    warn!("Failed to announce media state to peer {}: {}", user_id, e);
                }
            }
            BackendEvent::ChannelMessage { user_id, payload } => {
                match ControlMessage::from_bytes(&payload) {
                    Ok(message) => self.apply_control(&user_id, message).await,
                    Err(e) => warn!("Dropping control message from peer {}: {}", user_id, e),
                }
            }
        }
    }

    async fn apply_control(&self, user_id: &str, message: ControlMessage) {
        match message {
            ControlMessage::MediaState { .. } => {
                if let Some(state) = message.as_media_state() {
                    self.registry.update_remote_media(user_id, state).await;
                }
            }
            ControlMessage::Custom { payload } => {
                self.emit(EngineEvent::RemoteControl {
                    user_id: user_id.to_string(),
                    payload,
                });
            }
        }
    }

    /// Tear down a failed connection and schedule a bounded restart
    ///
    /// Only the lexicographically smaller userId re-offers, so both sides of
    /// a failed link never race fresh offers against each other.
    async fn handle_peer_failed(&self, user_id: &str) {
        warn!("Connection to peer {} failed", user_id);
        if !self.registry.close(user_id).await {
            debug!("Peer {} already torn down; not restarting", user_id);
            return;
        }
        self.emit(EngineEvent::peer_disconnected(user_id));

        if self.user_id.as_str() >= user_id {
            debug!("Peer {} is the restarting side", user_id);
            return;
        }

        let attempt = {
            let mut attempts = self.restart_attempts.lock().await;
            let entry = attempts.entry(user_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt > self.config.max_restart_attempts {
            warn!(
                "Giving up on peer {} after {} restart attempts",
                user_id,
                self.config.max_restart_attempts
            );
            self.restart_attempts.lock().await.remove(user_id);
            return;
        }

        let delay = self.config.restart_delay(attempt);
        info!(
            "Restarting connection to peer {} in {:?} (attempt {}/{})",
            user_id, delay, attempt, self.config.max_restart_attempts
        );

        let weak = self.weak.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            if coordinator.phase().await != SessionPhase::Joined {
                return;
            }
            // A userLeft during the backoff clears the attempt entry;
            // re-offering then would resurrect a departed peer
            if !coordinator
                .restart_attempts
                .lock()
                .await
                .contains_key(&user_id)
            {
                debug!("Peer {} left before restart fired; cancelling", user_id);
                return;
            }
            if coordinator.registry.get(&user_id).await.is_some() {
                debug!("Peer {} already reconnected; skipping restart", user_id);
                return;
            }
            if let Err(e) = coordinator.offer_to(&user_id).await {
                warn!("Restart offer to peer {} failed: {}", user_id, e);
            }
        });
    }

    /// Offer to a peer unless a live negotiation already covers the pair
    ///
    /// Presence events and the join roster can both nominate the same peer;
    /// whichever side negotiated first wins and the duplicate is skipped.
    async fn offer_if_absent(&self, user_id: &str) {
        if let Some(peer) = self.registry.get(user_id).await {
            if peer.state().await.is_live() {
                debug!("Connection to peer {} already underway", user_id);
                return;
            }
        }
        if let Err(e) = self.offer_to(user_id).await {
            warn!("Failed to offer to peer {}: {}", user_id, e);
        }
    }

    async fn offer_to(&self, user_id: &str) -> Result<()> {
        let stream = self.media.current_stream().await?;
        let offer = self.registry.create_offer(user_id, &stream).await?;
        self.signaling
            .send(SignalMessage::to_peer(
                user_id,
                SignalPayload::Offer { description: offer },
            ))
            .await
    }

    async fn answer_to(
        &self,
        user_id: &str,
        offer: crate::signaling::SessionDescription,
    ) -> Result<()> {
        let stream = self.media.current_stream().await?;
        let answer = self.registry.create_answer(user_id, offer, &stream).await?;
        self.signaling
            .send(SignalMessage::to_peer(
                user_id,
                SignalPayload::Answer {
                    description: answer,
                },
            ))
            .await
    }

    async fn broadcast_media_state(&self) {
        let message = ControlMessage::media_state(self.media.media_state().await);
        if let Err(e) = self.registry.send_control(None, &message).await {
            warn!("Failed to broadcast media state: {}", e);
        }
    }

    async fn emit_local_stream(&self) {
        match self.media.current_stream().await {
            Ok(stream) => self.emit(EngineEvent::LocalStreamUpdated { stream }),
            Err(e) => warn!("No local stream to emit: {}", e),
        }
    }

    async fn send_signal(&self, message: SignalMessage) {
        if let Err(e) = self.signaling.send(message).await {
            warn!("Signaling send failed: {}", e);
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver gone means the application is shutting down
        let _ = self.events.send(event);
    }
}
