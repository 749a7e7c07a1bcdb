//! Peer connection registry
//!
//! Owns every per-peer connection record in the session and is the only
//! place records are created, replaced, or torn down. All negotiation goes
//! through here so the single-live-connection rule and the candidate queue
//! are enforced in one place.

use crate::channels::ControlMessage;
use crate::events::EngineEvent;
use crate::media::{LocalStream, LocalTrack, MediaState, RemoteStream, TrackKind};
use crate::peer::backend::{BackendEvent, PeerBackendFactory, TransportState};
use crate::peer::connection::PeerConnection;
use crate::peer::state::PeerConnectionState;
use crate::signaling::{IceCandidate, SessionDescription};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Registry of all peer connections in one session
pub struct PeerConnectionRegistry {
    peers: RwLock<HashMap<String, Arc<PeerConnection>>>,
    factory: Arc<dyn PeerBackendFactory>,
    backend_tx: mpsc::UnboundedSender<BackendEvent>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl PeerConnectionRegistry {
    pub fn new(
        factory: Arc<dyn PeerBackendFactory>,
        backend_tx: mpsc::UnboundedSender<BackendEvent>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            factory,
            backend_tx,
            events,
        }
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<PeerConnection>> {
        self.peers.read().await.get(user_id).map(Arc::clone)
    }

    pub async fn peer_ids(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Create a connection to `user_id` as the offering side
    ///
    /// Any existing record for that peer is torn down first, so there is
    /// never more than one live connection per userId.
    pub async fn create_offer(
        &self,
        user_id: &str,
        stream: &LocalStream,
    ) -> Result<SessionDescription> {
        let peer = self.create_peer(user_id, true, stream).await?;
        self.transition(&peer, PeerConnectionState::Offering).await?;

        match peer.backend().create_offer().await {
            Ok(offer) => {
                info!("Created offer for peer {}", user_id);
                Ok(offer)
            }
            Err(e) => {
                self.fail_peer(&peer).await;
                Err(Error::NegotiationFailed(user_id.to_string(), e.to_string()))
            }
        }
    }

    /// Create a connection to `user_id` as the answering side
    ///
    /// Applies the remote offer, so the record lands in
    /// `have-remote-description` and queued candidates flush immediately.
    pub async fn create_answer(
        &self,
        user_id: &str,
        offer: SessionDescription,
        stream: &LocalStream,
    ) -> Result<SessionDescription> {
        let peer = self.create_peer(user_id, false, stream).await?;
        self.transition(&peer, PeerConnectionState::Answering)
            .await?;

        match peer.backend().create_answer(offer).await {
            Ok(answer) => {
                self.transition(&peer, PeerConnectionState::HaveRemoteDescription)
                    .await?;
                self.flush_pending(&peer).await;
                info!("Created answer for peer {}", user_id);
                Ok(answer)
            }
            Err(e) => {
                self.fail_peer(&peer).await;
                Err(Error::NegotiationFailed(user_id.to_string(), e.to_string()))
            }
        }
    }

    /// Apply the remote answer to a connection we offered on
    ///
    /// Rejected unless the record is in `offering`, which drops duplicate
    /// and stale answers without touching the transport.
    pub async fn apply_answer(&self, user_id: &str, answer: SessionDescription) -> Result<()> {
        let peer = self.require(user_id).await?;
        let state = peer.state().await;
        if state != PeerConnectionState::Offering {
            return Err(Error::InvalidStateTransition(format!(
                "peer {}: answer received in state {}",
                user_id, state
            )));
        }

        peer.backend()
            .apply_answer(answer)
            .await
            .map_err(|e| Error::NegotiationFailed(user_id.to_string(), e.to_string()))?;
        self.transition(&peer, PeerConnectionState::HaveRemoteDescription)
            .await?;
        self.flush_pending(&peer).await;
        Ok(())
    }

    /// Apply a remote candidate, or queue it when no remote description is set
    pub async fn enqueue_or_apply_candidate(
        &self,
        user_id: &str,
        candidate: IceCandidate,
    ) -> Result<()> {
        let peer = self.require(user_id).await?;
        if peer.state().await.has_remote_description() {
            if let Err(e) = peer.backend().add_candidate(candidate).await {
                warn!("Skipping bad candidate from peer {}: {}", user_id, e);
            }
        } else {
            let mut pending = peer.pending().lock().await;
            pending.push(candidate);
            debug!(
                "Queued candidate from peer {} ({} pending)",
                user_id,
                pending.len()
            );
        }
        Ok(())
    }

    /// Swap the outgoing video track on every live connection
    ///
    /// Per-peer failures are logged and skipped; returns how many
    /// connections were updated.
    pub async fn replace_outgoing_track(&self, track: Arc<LocalTrack>) -> usize {
        let peers: Vec<_> = self.peers.read().await.values().map(Arc::clone).collect();
        let mut replaced = 0;
        for peer in peers {
            if !peer.state().await.is_live() {
                continue;
            }
            match peer.backend().replace_video_track(Arc::clone(&track)).await {
                Ok(()) => replaced += 1,
                Err(e) => warn!(
                    "Failed to replace video track for peer {}: {}",
                    peer.user_id(),
                    e
                ),
            }
        }
        info!("Replaced outgoing video track on {} connection(s)", replaced);
        replaced
    }

    /// Send a control message to one peer, or to all peers when `target` is None
    ///
    /// Best effort: peers without an open channel are skipped silently, and
    /// send failures are logged without aborting the fan-out.
    pub async fn send_control(&self, target: Option<&str>, message: &ControlMessage) -> Result<()> {
        let payload = message.to_bytes()?;
        let peers: Vec<_> = match target {
            Some(user_id) => self.get(user_id).await.into_iter().collect(),
            None => self.peers.read().await.values().map(Arc::clone).collect(),
        };

        for peer in peers {
            if !peer.backend().channel_open().await {
                continue;
            }
            if let Err(e) = peer.backend().send_channel(payload.clone()).await {
                warn!(
                    "Failed to send {} to peer {}: {}",
                    message.name(),
                    peer.user_id(),
                    e
                );
            }
        }
        Ok(())
    }

    /// Tear down the connection to `user_id`. Idempotent.
    pub async fn close(&self, user_id: &str) -> bool {
        let peer = match self.peers.write().await.remove(user_id) {
            Some(peer) => peer,
            None => return false,
        };
        self.shutdown_peer(&peer).await;
        true
    }

    /// Tear down every connection
    pub async fn close_all(&self) {
        let peers: Vec<_> = self.peers.write().await.drain().map(|(_, p)| p).collect();
        for peer in peers {
            self.shutdown_peer(&peer).await;
        }
    }

    /// Fold a transport connectivity report into the state machine
    ///
    /// Returns the new state when a transition happened. Reports that do not
    /// map onto a legal edge (e.g. connectivity flaps on an already closed
    /// record) are dropped with a log line.
    pub async fn on_transport_state(
        &self,
        user_id: &str,
        transport: TransportState,
    ) -> Option<PeerConnectionState> {
        let peer = self.get(user_id).await?;
        let current = peer.state().await;
        let next = match transport {
            TransportState::Connected => PeerConnectionState::Connected,
            TransportState::Disconnected => PeerConnectionState::Disconnected,
            TransportState::Failed => PeerConnectionState::Failed,
            // An ICE restart shows up as connecting again after a drop
            TransportState::Connecting if current == PeerConnectionState::Disconnected => {
                PeerConnectionState::Reconnecting
            }
            TransportState::Connecting | TransportState::Closed => return None,
        };

        if current == next {
            return None;
        }
        match self.transition(&peer, next).await {
            Ok(()) => Some(next),
            Err(e) => {
                debug!("Ignoring transport report for peer {}: {}", user_id, e);
                None
            }
        }
    }

    /// Record an incoming remote track
    ///
    /// The first track creates the peer's [`RemoteStream`] and emits it;
    /// later tracks only fill the remaining slot. At most one
    /// [`EngineEvent::RemoteStream`] is emitted per live connection.
    pub async fn on_remote_track(
        &self,
        user_id: &str,
        stream_id: &str,
        track_id: &str,
        kind: TrackKind,
    ) {
        let peer = match self.get(user_id).await {
            Some(peer) => peer,
            None => {
                warn!("Dropping track from unknown peer {}", user_id);
                return;
            }
        };

        let mut slot = peer.remote_stream().write().await;
        match slot.as_mut() {
            Some(stream) => {
                if !stream.add_track(kind, track_id) {
                    debug!(
                        "Duplicate {} track from peer {} ignored",
                        kind.as_str(),
                        user_id
                    );
                }
            }
            None => {
                let mut stream = RemoteStream::new(stream_id);
                stream.add_track(kind, track_id);
                info!("Remote stream {} from peer {}", stream_id, user_id);
                self.emit(EngineEvent::remote_stream(user_id, stream.clone()));
                *slot = Some(stream);
            }
        }
    }

    /// Last media flags announced by a peer, if it is known
    pub async fn remote_media(&self, user_id: &str) -> Option<MediaState> {
        match self.get(user_id).await {
            Some(peer) => Some(peer.remote_media().await),
            None => None,
        }
    }

    /// Record a media state announcement from a peer
    pub async fn update_remote_media(&self, user_id: &str, state: MediaState) {
        let peer = match self.get(user_id).await {
            Some(peer) => peer,
            None => {
                warn!("Dropping media state from unknown peer {}", user_id);
                return;
            }
        };
        peer.set_remote_media(state).await;
        self.emit(EngineEvent::remote_media_state(user_id, state));
    }

    async fn create_peer(
        &self,
        user_id: &str,
        initiator: bool,
        stream: &LocalStream,
    ) -> Result<Arc<PeerConnection>> {
        if self.close(user_id).await {
            info!("Replacing existing connection to peer {}", user_id);
        }

        let backend = self
            .factory
            .create(user_id, initiator, self.backend_tx.clone())
            .await?;
        backend
            .attach_tracks(Arc::clone(stream.audio()), Arc::clone(stream.video()))
            .await?;

        let peer = Arc::new(PeerConnection::new(user_id, initiator, backend));
        self.peers
            .write()
            .await
            .insert(user_id.to_string(), Arc::clone(&peer));
        Ok(peer)
    }

    async fn require(&self, user_id: &str) -> Result<Arc<PeerConnection>> {
        self.get(user_id)
            .await
            .ok_or_else(|| Error::PeerNotFound(user_id.to_string()))
    }

    /// Flush queued candidates in arrival order, skipping bad ones
    async fn flush_pending(&self, peer: &PeerConnection) {
        let drained = peer.pending().lock().await.drain();
        if drained.is_empty() {
            return;
        }
        debug!(
            "Flushing {} queued candidate(s) for peer {}",
            drained.len(),
            peer.user_id()
        );
        for candidate in drained {
            if let Err(e) = peer.backend().add_candidate(candidate).await {
                warn!(
                    "Skipping bad queued candidate for peer {}: {}",
                    peer.user_id(),
                    e
                );
            }
        }
    }

    async fn transition(&self, peer: &PeerConnection, next: PeerConnectionState) -> Result<()> {
        peer.transition(next).await?;
        self.emit(EngineEvent::connection_state_change(peer.user_id(), next));
        Ok(())
    }

    async fn fail_peer(&self, peer: &PeerConnection) {
        if peer
            .transition(PeerConnectionState::Failed)
            .await
            .is_ok()
        {
            self.emit(EngineEvent::connection_state_change(
                peer.user_id(),
                PeerConnectionState::Failed,
            ));
        }
    }

    async fn shutdown_peer(&self, peer: &PeerConnection) {
        peer.force_closed().await;
        peer.pending().lock().await.clear();
        if let Err(e) = peer.backend().close().await {
            warn!("Error closing backend for peer {}: {}", peer.user_id(), e);
        }
        self.emit(EngineEvent::connection_state_change(
            peer.user_id(),
            PeerConnectionState::Closed,
        ));
        info!("Closed connection to peer {}", peer.user_id());
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver gone means the application is shutting down
        let _ = self.events.send(event);
    }
}
