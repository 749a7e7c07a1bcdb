//! Transport backend boundary
//!
//! A [`PeerBackend`] is one underlying transport connection (in production a
//! WebRTC peer connection, see [`crate::rtc`]). The registry drives it
//! through this trait and consumes its asynchronous output as
//! [`BackendEvent`]s, which keeps the state machine testable without any
//! network or media stack.

use crate::media::{LocalTrack, TrackKind};
use crate::signaling::{IceCandidate, SessionDescription};
use crate::Result;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connectivity as reported by the underlying transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        }
    }
}

/// Asynchronous output of a [`PeerBackend`]
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A local ICE candidate was gathered and must be signaled to the peer
    LocalCandidate {
        user_id: String,
        candidate: IceCandidate,
    },
    /// The transport connectivity changed
    TransportState {
        user_id: String,
        state: TransportState,
    },
    /// An incoming media track started
    RemoteTrack {
        user_id: String,
        stream_id: String,
        track_id: String,
        kind: TrackKind,
    },
    /// The control data channel became usable
    ChannelOpen { user_id: String },
    /// A control payload arrived on the data channel
    ChannelMessage { user_id: String, payload: Bytes },
}

impl BackendEvent {
    /// The peer this event concerns
    pub fn user_id(&self) -> &str {
        match self {
            BackendEvent::LocalCandidate { user_id, .. }
            | BackendEvent::TransportState { user_id, .. }
            | BackendEvent::RemoteTrack { user_id, .. }
            | BackendEvent::ChannelOpen { user_id }
            | BackendEvent::ChannelMessage { user_id, .. } => user_id,
        }
    }
}

/// One transport connection to one peer
#[async_trait::async_trait]
pub trait PeerBackend: Send + Sync {
    /// Produce the local offer and set it as local description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply the remote offer, produce the answer, set both descriptions
    async fn create_answer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Apply the remote answer to a connection we offered on
    async fn apply_answer(&self, answer: SessionDescription) -> Result<()>;

    /// Apply one remote ICE candidate
    ///
    /// Callers must not invoke this before a remote description is set;
    /// the peer record's queue enforces that.
    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Attach the outgoing audio and video tracks before negotiation
    async fn attach_tracks(&self, audio: Arc<LocalTrack>, video: Arc<LocalTrack>) -> Result<()>;

    /// Swap the outgoing video source without renegotiating
    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<()>;

    /// Whether the control data channel is open
    async fn channel_open(&self) -> bool;

    /// Send one payload on the control data channel
    async fn send_channel(&self, payload: Bytes) -> Result<()>;

    /// Tear the transport down. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Factory for [`PeerBackend`]s, injected into the registry
#[async_trait::async_trait]
pub trait PeerBackendFactory: Send + Sync {
    /// Create a transport connection to `user_id`
    ///
    /// `initiator` decides which side opens the control data channel. All
    /// asynchronous backend output goes to `events`.
    async fn create(
        &self,
        user_id: &str,
        initiator: bool,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Result<Arc<dyn PeerBackend>>;
}
