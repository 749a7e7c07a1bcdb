//! Session lifecycle
//!
//! The [`SessionCoordinator`] is the engine's top-level object: one per
//! local participant, wiring signaling, media and the peer registry into a
//! full-mesh session.

mod coordinator;

pub use coordinator::{SessionCoordinator, SessionPhase};
