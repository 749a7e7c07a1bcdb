//! Local media acquisition and ownership
//!
//! [`LocalMediaController`] is the single owner of the local capture stream
//! and its enabled flags. The registry only ever reads current tracks from
//! it; all mutation of the shared stream goes through here.

use crate::media::stream::{LocalStream, LocalTrack};
use crate::media::{MediaConstraints, MediaState, TrackKind};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capture device boundary
///
/// Implemented by the surrounding application; the engine only works with
/// the returned [`LocalTrack`] handles and never touches raw frames.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open camera and microphone capture
    ///
    /// Returns `(audio, video)` track handles. Fails with
    /// [`Error::MediaAccessDenied`] when permission is refused or
    /// [`Error::DeviceUnavailable`] when no device can be opened.
    async fn open_input(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<(Arc<LocalTrack>, Arc<LocalTrack>)>;

    /// Open a screen capture track
    async fn open_screen(&self) -> Result<Arc<LocalTrack>>;
}

/// Owner of the local audio/video/screen capture stream
pub struct LocalMediaController {
    source: Arc<dyn MediaSource>,
    stream_id: String,
    state: RwLock<MediaState>,
    audio: RwLock<Option<Arc<LocalTrack>>>,
    camera: RwLock<Option<Arc<LocalTrack>>>,
    screen: RwLock<Option<Arc<LocalTrack>>>,
}

impl LocalMediaController {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            stream_id: Uuid::new_v4().to_string(),
            state: RwLock::new(MediaState::default()),
            audio: RwLock::new(None),
            camera: RwLock::new(None),
            screen: RwLock::new(None),
        }
    }

    /// Request camera/microphone access and start hardware capture
    pub async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalStream> {
        info!("Acquiring local media: {:?}", constraints);

        let (audio, camera) = self.source.open_input(constraints).await?;
        audio.set_enabled(constraints.audio);
        camera.set_enabled(constraints.video);

        *self.state.write().await = MediaState {
            audio_enabled: constraints.audio,
            video_enabled: constraints.video,
            screen_sharing: false,
        };
        *self.audio.write().await = Some(Arc::clone(&audio));
        *self.camera.write().await = Some(Arc::clone(&camera));
        *self.screen.write().await = None;

        Ok(LocalStream::new(self.stream_id.clone(), audio, camera))
    }

    /// Stop capture and drop all track handles. Idempotent.
    pub async fn release(&self) {
        for slot in [&self.audio, &self.camera, &self.screen] {
            if let Some(track) = slot.write().await.take() {
                track.end();
            }
        }
        *self.state.write().await = MediaState::default();
        debug!("Local media released");
    }

    pub async fn is_acquired(&self) -> bool {
        self.audio.read().await.is_some()
    }

    /// Current announced media state
    pub async fn media_state(&self) -> MediaState {
        *self.state.read().await
    }

    /// Snapshot of the currently outgoing tracks
    ///
    /// The video slot is the screen track while sharing, the camera track
    /// otherwise.
    pub async fn current_stream(&self) -> Result<LocalStream> {
        let audio = self.require_track(&self.audio).await?;
        let video = match self.screen.read().await.as_ref() {
            Some(screen) => Arc::clone(screen),
            None => self.require_track(&self.camera).await?,
        };
        Ok(LocalStream::new(self.stream_id.clone(), audio, video))
    }

    /// Flip the audio enabled flag; returns the new state
    ///
    /// Track enablement is a property of the track, not a structural change,
    /// so no renegotiation happens here.
    pub async fn toggle_audio(&self) -> Result<bool> {
        let track = self.require_track(&self.audio).await?;
        let mut state = self.state.write().await;
        state.audio_enabled = !state.audio_enabled;
        track.set_enabled(state.audio_enabled);
        debug!("Audio enabled: {}", state.audio_enabled);
        Ok(state.audio_enabled)
    }

    /// Flip the video enabled flag; returns the new state
    pub async fn toggle_video(&self) -> Result<bool> {
        let camera = self.require_track(&self.camera).await?;
        let mut state = self.state.write().await;
        state.video_enabled = !state.video_enabled;
        camera.set_enabled(state.video_enabled);
        if let Some(screen) = self.screen.read().await.as_ref() {
            screen.set_enabled(state.video_enabled);
        }
        debug!("Video enabled: {}", state.video_enabled);
        Ok(state.video_enabled)
    }

    /// Replace the outgoing video source with a screen capture track
    ///
    /// Structural change: the returned track must be fanned out to every
    /// open peer connection via a track replacement, not a fresh
    /// offer/answer cycle.
    pub async fn start_screen_share(&self) -> Result<Arc<LocalTrack>> {
        if self.audio.read().await.is_none() {
            return Err(Error::DeviceUnavailable(
                "local media not acquired".to_string(),
            ));
        }
        if self.state.read().await.screen_sharing {
            warn!("Screen share already active");
            return self.require_track(&self.screen).await;
        }

        let screen = self.source.open_screen().await?;
        screen.set_enabled(self.state.read().await.video_enabled);
        *self.screen.write().await = Some(Arc::clone(&screen));
        self.state.write().await.screen_sharing = true;

        info!("Screen share started: track {}", screen.id());
        Ok(screen)
    }

    /// Revert the outgoing video source to the camera track
    ///
    /// Returns the camera track to fan back out. Idempotent: reverting while
    /// not sharing just returns the camera track.
    pub async fn revert_to_camera(&self) -> Result<Arc<LocalTrack>> {
        if let Some(screen) = self.screen.write().await.take() {
            screen.end();
            info!("Screen share stopped: track {}", screen.id());
        }
        self.state.write().await.screen_sharing = false;
        self.require_track(&self.camera).await
    }

    pub async fn is_screen_sharing(&self) -> bool {
        self.state.read().await.screen_sharing
    }

    async fn require_track(
        &self,
        slot: &RwLock<Option<Arc<LocalTrack>>>,
    ) -> Result<Arc<LocalTrack>> {
        slot.read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| Error::DeviceUnavailable("local media not acquired".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestSource;

    #[async_trait]
    impl MediaSource for TestSource {
        async fn open_input(
            &self,
            _constraints: &MediaConstraints,
        ) -> Result<(Arc<LocalTrack>, Arc<LocalTrack>)> {
            Ok((
                LocalTrack::new(TrackKind::Audio, "microphone"),
                LocalTrack::new(TrackKind::Video, "camera"),
            ))
        }

        async fn open_screen(&self) -> Result<Arc<LocalTrack>> {
            Ok(LocalTrack::new(TrackKind::Video, "screen"))
        }
    }

    struct DeniedSource;

    #[async_trait]
    impl MediaSource for DeniedSource {
        async fn open_input(
            &self,
            _constraints: &MediaConstraints,
        ) -> Result<(Arc<LocalTrack>, Arc<LocalTrack>)> {
            Err(Error::MediaAccessDenied("user refused".to_string()))
        }

        async fn open_screen(&self) -> Result<Arc<LocalTrack>> {
            Err(Error::MediaAccessDenied("user refused".to_string()))
        }
    }

    fn controller() -> LocalMediaController {
        LocalMediaController::new(Arc::new(TestSource))
    }

    #[tokio::test]
    async fn test_acquire_and_toggle_audio() {
        let media = controller();
        let stream = media.acquire(&MediaConstraints::default()).await.unwrap();
        assert!(stream.audio().is_enabled());

        assert!(!media.toggle_audio().await.unwrap());
        assert!(!stream.audio().is_enabled());
        assert!(media.toggle_audio().await.unwrap());
        assert!(stream.audio().is_enabled());
    }

    #[tokio::test]
    async fn test_toggle_without_acquire_fails() {
        let media = controller();
        assert!(matches!(
            media.toggle_audio().await,
            Err(Error::DeviceUnavailable(_))
        ));
        assert!(matches!(
            media.toggle_video().await,
            Err(Error::DeviceUnavailable(_))
        ));
        // A refused toggle must not leave the announced flags mutated
        let state = media.media_state().await;
        assert!(state.audio_enabled);
        assert!(state.video_enabled);
    }

    #[tokio::test]
    async fn test_acquire_denied_propagates() {
        let media = LocalMediaController::new(Arc::new(DeniedSource));
        assert!(matches!(
            media.acquire(&MediaConstraints::default()).await,
            Err(Error::MediaAccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_screen_share_swaps_video_slot() {
        let media = controller();
        media.acquire(&MediaConstraints::default()).await.unwrap();

        let camera = media.current_stream().await.unwrap().video().clone();
        let screen = media.start_screen_share().await.unwrap();
        assert!(media.is_screen_sharing().await);
        assert_eq!(media.current_stream().await.unwrap().video().id(), screen.id());

        let reverted = media.revert_to_camera().await.unwrap();
        assert!(!media.is_screen_sharing().await);
        assert_eq!(reverted.id(), camera.id());
        assert!(screen.is_ended());
    }

    #[tokio::test]
    async fn test_revert_without_share_is_idempotent() {
        let media = controller();
        media.acquire(&MediaConstraints::default()).await.unwrap();
        let camera = media.current_stream().await.unwrap().video().clone();
        let track = media.revert_to_camera().await.unwrap();
        assert_eq!(track.id(), camera.id());
    }

    #[tokio::test]
    async fn test_toggle_video_applies_to_screen_track() {
        let media = controller();
        media.acquire(&MediaConstraints::default()).await.unwrap();
        let screen = media.start_screen_share().await.unwrap();

        assert!(!media.toggle_video().await.unwrap());
        assert!(!screen.is_enabled());
    }

    #[tokio::test]
    async fn test_release_ends_tracks() {
        let media = controller();
        let stream = media.acquire(&MediaConstraints::default()).await.unwrap();
        media.release().await;
        assert!(stream.audio().is_ended());
        assert!(!media.is_acquired().await);
        assert!(media.current_stream().await.is_err());
    }
}
