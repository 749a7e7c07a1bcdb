//! Engine event stream
//!
//! Everything the surrounding application needs to render a session arrives
//! as [`EngineEvent`]s on the receiver returned from
//! [`crate::session::SessionCoordinator::new`]. Events are emitted in a
//! consistent order per peer but carry no cross-peer ordering guarantee.

use crate::media::{LocalStream, MediaState, RemoteStream};
use crate::peer::PeerConnectionState;

/// Event emitted by the session engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A remote participant's media stream became available
    ///
    /// Emitted at most once per live connection to a peer.
    RemoteStream {
        user_id: String,
        stream: RemoteStream,
    },
    /// A peer connection changed state
    ConnectionStateChange {
        user_id: String,
        state: PeerConnectionState,
    },
    /// A peer connection was torn down after failure or departure
    PeerDisconnected { user_id: String },
    /// The outgoing local stream changed (acquired, or video source swapped)
    LocalStreamUpdated { stream: LocalStream },
    /// A remote participant announced new media flags
    RemoteMediaState { user_id: String, state: MediaState },
    /// An application-defined control payload arrived from a peer
    RemoteControl {
        user_id: String,
        payload: serde_json::Value,
    },
}

impl EngineEvent {
    pub fn remote_stream(user_id: impl Into<String>, stream: RemoteStream) -> Self {
        EngineEvent::RemoteStream {
            user_id: user_id.into(),
            stream,
        }
    }

    pub fn connection_state_change(
        user_id: impl Into<String>,
        state: PeerConnectionState,
    ) -> Self {
        EngineEvent::ConnectionStateChange {
            user_id: user_id.into(),
            state,
        }
    }

    pub fn peer_disconnected(user_id: impl Into<String>) -> Self {
        EngineEvent::PeerDisconnected {
            user_id: user_id.into(),
        }
    }

    pub fn remote_media_state(user_id: impl Into<String>, state: MediaState) -> Self {
        EngineEvent::RemoteMediaState {
            user_id: user_id.into(),
            state,
        }
    }

    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::RemoteStream { .. } => "remote_stream",
            EngineEvent::ConnectionStateChange { .. } => "connection_state_change",
            EngineEvent::PeerDisconnected { .. } => "peer_disconnected",
            EngineEvent::LocalStreamUpdated { .. } => "local_stream_updated",
            EngineEvent::RemoteMediaState { .. } => "remote_media_state",
            EngineEvent::RemoteControl { .. } => "remote_control",
        }
    }
}
