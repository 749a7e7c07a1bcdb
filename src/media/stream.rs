//! Track and stream handles
//!
//! A [`LocalTrack`] is a handle to one outgoing capture track. Enablement is
//! a flag flip (no renegotiation); the producing side checks [`LocalTrack::is_enabled`]
//! before emitting frames. Track end (e.g. the user stops a screen share via
//! the OS chrome) is a latched `watch` signal so the controller can auto-revert.

use crate::media::TrackKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Handle to one outgoing local media track
pub struct LocalTrack {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    ended_tx: watch::Sender<bool>,
}

impl LocalTrack {
    /// Create a new enabled track with a generated id
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Arc<Self> {
        let (ended_tx, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            enabled: AtomicBool::new(true),
            ended_tx,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Human-readable source label, e.g. "camera" or "screen"
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Flip the enabled flag; returns the new value
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.store(enabled, Ordering::Release);
        enabled
    }

    /// Mark the track as ended. Latched; subsequent calls are no-ops.
    pub fn end(&self) {
        self.ended_tx.send_replace(true);
    }

    pub fn is_ended(&self) -> bool {
        *self.ended_tx.borrow()
    }

    /// Subscribe to the end-of-track signal
    pub fn ended(&self) -> watch::Receiver<bool> {
        self.ended_tx.subscribe()
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Snapshot of the currently outgoing local tracks
///
/// The video slot carries the camera track normally and the screen track
/// while a screen share is active, so a peer connection attached from this
/// snapshot never sees a stale source.
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    audio: Arc<LocalTrack>,
    video: Arc<LocalTrack>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, audio: Arc<LocalTrack>, video: Arc<LocalTrack>) -> Self {
        Self {
            id: id.into(),
            audio,
            video,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn audio(&self) -> &Arc<LocalTrack> {
        &self.audio
    }

    pub fn video(&self) -> &Arc<LocalTrack> {
        &self.video
    }
}

/// Descriptor for a remote participant's media stream
///
/// The actual media is owned by the underlying peer connection; this handle
/// only identifies it for the display layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    /// Remote stream identifier as negotiated
    pub id: String,
    /// Remote audio track id, once received
    pub audio_track: Option<String>,
    /// Remote video track id, once received
    pub video_track: Option<String>,
}

impl RemoteStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audio_track: None,
            video_track: None,
        }
    }

    /// Record an incoming track; returns false if the slot was already filled
    pub fn add_track(&mut self, kind: TrackKind, track_id: impl Into<String>) -> bool {
        let slot = match kind {
            TrackKind::Audio => &mut self.audio_track,
            TrackKind::Video => &mut self.video_track,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(track_id.into());
        true
    }
}
