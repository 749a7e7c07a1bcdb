//! Control message wire format
//!
//! Control messages travel over each peer connection's data channel, not
//! through signaling, so they keep working when the signaling transport is
//! gone. JSON-encoded; unknown `type` tags are rejected at decode time and
//! the caller drops the message.

use crate::media::MediaState;
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Upper bound on an encoded control message
///
/// Messages above this size are refused on both encode and decode. Control
/// traffic is tiny state updates; anything bigger is a bug or abuse.
pub const MAX_CONTROL_MESSAGE_SIZE: usize = 16 * 1024;

/// In-session control message exchanged over the data channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Announce the sender's current media flags
    MediaState {
        audio_enabled: bool,
        video_enabled: bool,
        screen_sharing: bool,
    },
    /// Application-defined payload, passed through opaquely
    Custom { payload: serde_json::Value },
}

impl ControlMessage {
    pub fn media_state(state: MediaState) -> Self {
        ControlMessage::MediaState {
            audio_enabled: state.audio_enabled,
            video_enabled: state.video_enabled,
            screen_sharing: state.screen_sharing,
        }
    }

    /// Media state carried by this message, if it is one
    pub fn as_media_state(&self) -> Option<MediaState> {
        match self {
            ControlMessage::MediaState {
                audio_enabled,
                video_enabled,
                screen_sharing,
            } => Some(MediaState {
                audio_enabled: *audio_enabled,
                video_enabled: *video_enabled,
                screen_sharing: *screen_sharing,
            }),
            ControlMessage::Custom { .. } => None,
        }
    }

    /// Message name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::MediaState { .. } => "media_state",
            ControlMessage::Custom { .. } => "custom",
        }
    }

    /// Encode for data channel transmission
    pub fn to_bytes(&self) -> Result<Bytes> {
        let encoded = serde_json::to_vec(self)
            .map_err(|e| Error::DataChannelError(format!("Failed to encode control message: {}", e)))?;
        if encoded.len() > MAX_CONTROL_MESSAGE_SIZE {
            return Err(Error::DataChannelError(format!(
                "Control message too large: {} bytes (max {})",
                encoded.len(),
                MAX_CONTROL_MESSAGE_SIZE
            )));
        }
        Ok(Bytes::from(encoded))
    }

    /// Decode a data channel payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_CONTROL_MESSAGE_SIZE {
            return Err(Error::DataChannelError(format!(
                "Control message too large: {} bytes (max {})",
                data.len(),
                MAX_CONTROL_MESSAGE_SIZE
            )));
        }
        serde_json::from_slice(data)
            .map_err(|e| Error::DataChannelError(format!("Failed to decode control message: {}", e)))
    }
}
