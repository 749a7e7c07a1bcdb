//! Local and remote media handles
//!
//! Owns the local capture stream (camera/microphone/screen) and the
//! enabled/disabled flags announced to peers. The engine never touches
//! raw frames; the surrounding application feeds them into the
//! [`LocalTrack`] handles produced by an injected [`MediaSource`].

pub mod controller;
pub mod stream;

pub use controller::{LocalMediaController, MediaSource};
pub use stream::{LocalStream, LocalTrack, RemoteStream};

use serde::{Deserialize, Serialize};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Enabled/disabled flags for a participant's media
///
/// One copy describes the local stream; one copy per remote participant
/// mirrors the control messages received from that peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_sharing: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            screen_sharing: false,
        }
    }
}

/// Capture constraints passed to [`MediaSource::open_input`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}
