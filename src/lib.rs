//! # stagemesh
//!
//! Full-mesh WebRTC session engine for small real-time rooms. Every
//! participant holds one peer connection to every other participant; the
//! engine owns negotiation, per-peer state machines, ICE candidate
//! buffering, data channel control traffic and bounded connection restarts.
//!
//! The engine is transport-agnostic at both edges: signaling goes through
//! an injected [`SignalingPort`], capture devices through a
//! [`MediaSource`], and the WebRTC stack itself sits behind the
//! [`PeerBackend`] trait with a production implementation in [`rtc`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagemesh::{
//!     EngineConfig, MediaConstraints, SessionCoordinator, WebRtcFactory,
//! };
//! # use stagemesh::{MediaSource, SignalingPort};
//! # async fn run(signaling: Arc<dyn SignalingPort>, source: Arc<dyn MediaSource>) -> stagemesh::Result<()> {
//! let config = EngineConfig::default();
//! let factory = Arc::new(WebRtcFactory::new(config.clone()));
//! let (session, mut events) =
//!     SessionCoordinator::new("alice", config, signaling, source, factory);
//!
//! session.join("standup", MediaConstraints::default()).await?;
//! while let Some(event) = events.recv().await {
//!     println!("engine event: {}", event.name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod peer;
pub mod rtc;
pub mod session;
pub mod signaling;

pub use channels::{ControlMessage, MAX_CONTROL_MESSAGE_SIZE};
pub use config::{EngineConfig, IceServerConfig};
pub use error::{Error, Result};
pub use events::EngineEvent;
pub use media::{
    LocalMediaController, LocalStream, LocalTrack, MediaConstraints, MediaSource, MediaState,
    RemoteStream, TrackKind,
};
pub use peer::{
    BackendEvent, PeerBackend, PeerBackendFactory, PeerConnectionRegistry, PeerConnectionState,
    TransportState,
};
pub use rtc::{WebRtcFactory, WebRtcPeerBackend};
pub use session::{SessionCoordinator, SessionPhase};
pub use signaling::{
    IceCandidate, SdpKind, SessionDescription, SignalEvent, SignalMessage, SignalPayload,
    SignalTarget, SignalingPort,
};
