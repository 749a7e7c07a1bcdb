//! Peer connection management
//!
//! One [`PeerConnection`] record per remote participant, collected in the
//! [`PeerConnectionRegistry`]. The actual transport hides behind the
//! [`PeerBackend`] trait so the state machine and candidate queue can be
//! exercised without a network stack.

mod backend;
mod candidates;
mod connection;
mod registry;
mod state;

pub use backend::{BackendEvent, PeerBackend, PeerBackendFactory, TransportState};
pub use candidates::PendingCandidateQueue;
pub use connection::PeerConnection;
pub use registry::PeerConnectionRegistry;
pub use state::PeerConnectionState;
