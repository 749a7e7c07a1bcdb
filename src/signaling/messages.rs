//! Signaling wire types
//!
//! Offer/answer/candidate/presence messages exchanged through the injected
//! [`crate::signaling::SignalingPort`]. The engine never assumes ordering or
//! at-most-once delivery for these; duplicates and stale messages are
//! tolerated by the handlers.

use serde::{Deserialize, Serialize};

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Negotiated description of media capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One proposed network path, as produced during ICE gathering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Addressing for an outbound signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalTarget {
    /// Deliver to one participant
    Peer(String),
    /// Deliver to every participant in the session
    Broadcast,
}

/// Payload of an outbound signaling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalPayload {
    Join,
    Leave,
    Offer { description: SessionDescription },
    Answer { description: SessionDescription },
    IceCandidate { candidate: IceCandidate },
    Control { payload: serde_json::Value },
}

/// Outbound signaling message handed to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub to: SignalTarget,
    pub payload: SignalPayload,
}

impl SignalMessage {
    pub fn to_peer(user_id: impl Into<String>, payload: SignalPayload) -> Self {
        Self {
            to: SignalTarget::Peer(user_id.into()),
            payload,
        }
    }

    pub fn broadcast(payload: SignalPayload) -> Self {
        Self {
            to: SignalTarget::Broadcast,
            payload,
        }
    }
}

/// Inbound signaling event delivered to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalEvent {
    UserJoined {
        user_id: String,
    },
    UserLeft {
        user_id: String,
    },
    Offer {
        user_id: String,
        description: SessionDescription,
    },
    Answer {
        user_id: String,
        description: SessionDescription,
    },
    IceCandidate {
        user_id: String,
        candidate: IceCandidate,
    },
    Control {
        user_id: String,
        payload: serde_json::Value,
    },
}

impl SignalEvent {
    /// The userId this event originates from
    pub fn user_id(&self) -> &str {
        match self {
            SignalEvent::UserJoined { user_id }
            | SignalEvent::UserLeft { user_id }
            | SignalEvent::Offer { user_id, .. }
            | SignalEvent::Answer { user_id, .. }
            | SignalEvent::IceCandidate { user_id, .. }
            | SignalEvent::Control { user_id, .. } => user_id,
        }
    }

    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SignalEvent::UserJoined { .. } => "user_joined",
            SignalEvent::UserLeft { .. } => "user_left",
            SignalEvent::Offer { .. } => "offer",
            SignalEvent::Answer { .. } => "answer",
            SignalEvent::IceCandidate { .. } => "ice_candidate",
            SignalEvent::Control { .. } => "control",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_payload_tagging() {
        let msg = SignalMessage::to_peer(
            "bob",
            SignalPayload::Offer {
                description: SessionDescription::offer("v=0"),
            },
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["payload"]["type"], "offer");
        assert_eq!(json["payload"]["description"]["kind"], "offer");

        let back: SignalMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_signal_event_round_trip() {
        let event = SignalEvent::IceCandidate {
            user_id: "alice".to_string(),
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2130706431 192.0.2.1 54321 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SignalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.user_id(), "alice");
        assert_eq!(back.name(), "ice_candidate");
    }
}
