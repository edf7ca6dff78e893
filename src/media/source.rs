use crate::error::{CallError, Result};
use crate::media::track::MediaTrack;
use crate::utils::random_id;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Camera and microphone returned by one user-media request
#[derive(Debug, Clone)]
pub struct UserMedia {
    pub audio: Arc<MediaTrack>,
    pub video: Arc<MediaTrack>,
}

/// Where local tracks come from.
///
/// `user_media` fails with `PermissionDenied` or `DeviceUnavailable`,
/// `display_media` with `ScreenShareDenied`.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn user_media(&self) -> Result<UserMedia>;

    async fn display_media(&self) -> Result<Arc<MediaTrack>>;
}

/// Media source backed by webrtc sample tracks.
///
/// The embedding application feeds encoded frames through
/// [`MediaTrack::write_sample`].
#[derive(Debug, Clone)]
pub struct SampleMediaSource {
    stream_id: String,
    screen_capture: bool,
}

impl SampleMediaSource {
    pub fn new() -> Self {
        Self {
            stream_id: format!("local-{}", random_id()),
            screen_capture: true,
        }
    }

    /// Disallow screen capture, as if the picker were always cancelled
    pub fn without_screen_capture(mut self) -> Self {
        self.screen_capture = false;
        self
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

impl Default for SampleMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for SampleMediaSource {
    async fn user_media(&self) -> Result<UserMedia> {
        debug!(stream_id = %self.stream_id, "creating camera and microphone tracks");
        Ok(UserMedia {
            audio: Arc::new(MediaTrack::audio("microphone", &self.stream_id)),
            video: Arc::new(MediaTrack::video("camera", &self.stream_id)),
        })
    }

    async fn display_media(&self) -> Result<Arc<MediaTrack>> {
        if !self.screen_capture {
            return Err(CallError::ScreenShareDenied(
                "screen capture is disabled".into(),
            ));
        }
        debug!(stream_id = %self.stream_id, "creating screen capture track");
        Ok(Arc::new(MediaTrack::video("screen", &self.stream_id)))
    }
}
