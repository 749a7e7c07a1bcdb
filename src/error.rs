//! Error types for the stage session engine

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the session engine
///
/// Join-time failures (`MediaAccessDenied`, `DeviceUnavailable`,
/// `SignalingUnavailable`) are terminal for the `join()` call that produced
/// them. Per-peer negotiation failures are isolated to that peer and reported
/// through the event stream instead of failing the calling operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Camera/microphone permission was refused
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),

    /// Capture hardware could not be opened
    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Protocol misuse, e.g. an answer applied to a peer that is not offering
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The signaling transport could not be opened
    #[error("signaling unavailable: {0}")]
    SignalingUnavailable(String),

    /// ICE/DTLS could not establish for one peer
    #[error("negotiation failed for peer {0}: {1}")]
    NegotiationFailed(String, String),

    /// Operation referenced a userId with no registry entry
    #[error("unknown peer: {0}")]
    PeerNotFound(String),

    /// `join()` called while a session is already active
    #[error("already in a session: {0}")]
    AlreadyJoined(String),

    /// Data channel operation failed
    #[error("data channel error: {0}")]
    DataChannelError(String),

    /// Error from the underlying WebRTC stack
    #[error("webrtc error: {0}")]
    WebRtcError(String),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    InternalError(String),
}
