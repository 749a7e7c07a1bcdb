//! Signaling boundary
//!
//! The engine never speaks to a signaling server itself; it sends outbound
//! messages through an injected [`SignalingPort`] and receives inbound
//! events via [`crate::session::SessionCoordinator::handle_signal`]. How the
//! messages actually travel (WebSocket, gRPC, carrier pigeon) is the
//! surrounding application's concern.

mod messages;

pub use messages::{
    IceCandidate, SdpKind, SessionDescription, SignalEvent, SignalMessage, SignalPayload,
    SignalTarget,
};

use crate::Result;
use async_trait::async_trait;

/// Outbound half of the signaling boundary
#[async_trait]
pub trait SignalingPort: Send + Sync {
    /// Open the transport for one session
    ///
    /// Returns the userIds already present in the session so the caller can
    /// initiate offers to them. Fails with
    /// [`crate::Error::SignalingUnavailable`] when the transport cannot be
    /// opened; that failure is terminal for the `join()` that triggered it.
    async fn open(&self, session_id: &str, user_id: &str) -> Result<Vec<String>>;

    /// Send one message; best effort, the transport may drop or duplicate
    async fn send(&self, message: SignalMessage) -> Result<()>;

    /// Close the transport. Idempotent.
    async fn close(&self) -> Result<()>;
}
