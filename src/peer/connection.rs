//! Per-peer connection record

use crate::media::{MediaState, RemoteStream};
use crate::peer::backend::PeerBackend;
use crate::peer::candidates::PendingCandidateQueue;
use crate::peer::state::PeerConnectionState;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Everything the engine tracks about one peer
///
/// There is at most one live record per userId; the registry enforces that
/// by closing any existing record before creating a replacement.
pub struct PeerConnection {
    user_id: String,
    initiator: bool,
    backend: Arc<dyn PeerBackend>,
    state: RwLock<PeerConnectionState>,
    pending: Mutex<PendingCandidateQueue>,
    remote_media: RwLock<MediaState>,
    remote_stream: RwLock<Option<RemoteStream>>,
}

impl PeerConnection {
    pub fn new(user_id: impl Into<String>, initiator: bool, backend: Arc<dyn PeerBackend>) -> Self {
        Self {
            user_id: user_id.into(),
            initiator,
            backend,
            state: RwLock::new(PeerConnectionState::New),
            pending: Mutex::new(PendingCandidateQueue::new()),
            remote_media: RwLock::new(MediaState::default()),
            remote_stream: RwLock::new(None),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn backend(&self) -> &Arc<dyn PeerBackend> {
        &self.backend
    }

    pub async fn state(&self) -> PeerConnectionState {
        *self.state.read().await
    }

    /// Move to `next`, validating the edge
    pub async fn transition(&self, next: PeerConnectionState) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition(format!(
                "peer {}: {} -> {}",
                self.user_id, *state, next
            )));
        }
        debug!("Peer {} state: {} -> {}", self.user_id, *state, next);
        *state = next;
        Ok(())
    }

    /// Force `Closed` regardless of current state
    ///
    /// Teardown must always succeed, so close bypasses edge validation.
    pub async fn force_closed(&self) {
        let mut state = self.state.write().await;
        if !state.is_closed() {
            debug!("Peer {} state: {} -> closed (forced)", self.user_id, *state);
            *state = PeerConnectionState::Closed;
        }
    }

    pub fn pending(&self) -> &Mutex<PendingCandidateQueue> {
        &self.pending
    }

    pub async fn remote_media(&self) -> MediaState {
        *self.remote_media.read().await
    }

    pub async fn set_remote_media(&self, state: MediaState) {
        *self.remote_media.write().await = state;
    }

    pub fn remote_stream(&self) -> &RwLock<Option<RemoteStream>> {
        &self.remote_stream
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("user_id", &self.user_id)
            .field("initiator", &self.initiator)
            .finish()
    }
}
