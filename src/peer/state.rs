//! Per-peer connection state machine
//!
//! Every peer connection record owns exactly one [`PeerConnectionState`]
//! and may only move along the edges validated by
//! [`PeerConnectionState::can_transition_to`]. Invalid transitions are
//! rejected, never silently applied; handlers log and drop the triggering
//! message instead.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerConnectionState {
    /// Record created, no negotiation started
    New,
    /// We sent an offer and are waiting for the answer
    Offering,
    /// We received an offer and are producing the answer
    Answering,
    /// Remote description applied; transport is connecting
    HaveRemoteDescription,
    /// Media and data are flowing
    Connected,
    /// Transport dropped; may recover on its own
    Disconnected,
    /// A bounded restart is in progress
    Reconnecting,
    /// Negotiation or transport failed terminally
    Failed,
    /// Torn down; terminal
    Closed,
}

impl PeerConnectionState {
    /// Whether moving to `next` is a legal edge
    pub fn can_transition_to(&self, next: PeerConnectionState) -> bool {
        use PeerConnectionState::*;
        match (*self, next) {
            (New, Offering) | (New, Answering) | (New, Closed) => true,
            (Offering, HaveRemoteDescription) | (Offering, Failed) | (Offering, Closed) => true,
            (Answering, HaveRemoteDescription) | (Answering, Failed) | (Answering, Closed) => true,
            (HaveRemoteDescription, Connected)
            | (HaveRemoteDescription, Disconnected)
            | (HaveRemoteDescription, Failed)
            | (HaveRemoteDescription, Closed) => true,
            (Connected, Disconnected) | (Connected, Failed) | (Connected, Closed) => true,
            (Disconnected, Reconnecting)
            | (Disconnected, Connected)
            | (Disconnected, Failed)
            | (Disconnected, Closed) => true,
            (Reconnecting, Connected) | (Reconnecting, Failed) | (Reconnecting, Closed) => true,
            (Failed, Closed) => true,
            _ => false,
        }
    }

    /// Whether a remote description has been applied
    ///
    /// ICE candidates may only be applied to the transport in these states;
    /// earlier arrivals are queued.
    pub fn has_remote_description(&self) -> bool {
        matches!(
            self,
            PeerConnectionState::HaveRemoteDescription
                | PeerConnectionState::Connected
                | PeerConnectionState::Disconnected
                | PeerConnectionState::Reconnecting
        )
    }

    /// Whether the record still participates in the session
    pub fn is_live(&self) -> bool {
        !matches!(
            self,
            PeerConnectionState::Failed | PeerConnectionState::Closed
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PeerConnectionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Offering => "offering",
            PeerConnectionState::Answering => "answering",
            PeerConnectionState::HaveRemoteDescription => "have-remote-description",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Reconnecting => "reconnecting",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PeerConnectionState::*;

    #[test]
    fn test_happy_path_edges() {
        assert!(New.can_transition_to(Offering));
        assert!(Offering.can_transition_to(HaveRemoteDescription));
        assert!(HaveRemoteDescription.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(Disconnected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connected));
    }

    #[test]
    fn test_illegal_edges_rejected() {
        assert!(!New.can_transition_to(Connected));
        assert!(!Offering.can_transition_to(Answering));
        assert!(!Connected.can_transition_to(Offering));
        assert!(!Failed.can_transition_to(Connected));
        assert!(!Closed.can_transition_to(New));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_everything_reaches_closed_except_closed() {
        for state in [
            New,
            Offering,
            Answering,
            HaveRemoteDescription,
            Connected,
            Disconnected,
            Reconnecting,
            Failed,
        ] {
            assert!(state.can_transition_to(Closed), "{state} -> closed");
        }
    }

    #[test]
    fn test_has_remote_description() {
        assert!(!New.has_remote_description());
        assert!(!Offering.has_remote_description());
        assert!(HaveRemoteDescription.has_remote_description());
        assert!(Connected.has_remote_description());
        assert!(Reconnecting.has_remote_description());
        assert!(!Closed.has_remote_description());
    }

    #[test]
    fn test_liveness() {
        assert!(Connected.is_live());
        assert!(New.is_live());
        assert!(!Failed.is_live());
        assert!(!Closed.is_live());
        assert!(Closed.is_closed());
    }
}
