use crate::error::{CallError, Result};
use crate::media::source::MediaSource;
use crate::media::track::{LocalMediaBundle, MediaTrack, TrackKind, VideoSource};
use crate::utils::lock;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// The sender side a screen-share swap feeds into
#[async_trait]
pub trait OutgoingVideo: Send + Sync {
    async fn replace_outgoing_video_track(&self, track: Arc<MediaTrack>) -> Result<()>;
}

#[derive(Debug, Default)]
enum Acquisition {
    #[default]
    NotStarted,
    Pending,
    Failed(CallError),
    Done,
}

#[derive(Debug, Default)]
struct MediaState {
    bundle: Option<LocalMediaBundle>,
    /// Camera track parked while the screen is shared
    camera: Option<Arc<MediaTrack>>,
    acquisition: Acquisition,
    share_in_flight: bool,
    released: bool,
}

/// Owns the local tracks of one call attempt
pub struct MediaTrackController {
    source: Arc<dyn MediaSource>,
    state: Mutex<MediaState>,
}

impl MediaTrackController {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            state: Mutex::new(MediaState::default()),
        }
    }

    /// Acquire camera and microphone.
    ///
    /// The user is prompted at most once; later calls return the acquired bundle or
    /// the recorded failure. Media that arrives after [`release`](Self::release) is
    /// stopped and discarded.
    pub async fn acquire_local_media(&self) -> Result<LocalMediaBundle> {
        {
            let mut state = lock(&self.state);
            if state.released {
                return Err(CallError::SessionClosed);
            }
            if let Some(bundle) = &state.bundle {
                return Ok(bundle.clone());
            }
            match &state.acquisition {
                Acquisition::Pending => {
                    return Err(CallError::DeviceUnavailable(
                        "media acquisition already in progress".into(),
                    ))
                }
                Acquisition::Failed(err) => return Err(err.clone()),
                Acquisition::NotStarted | Acquisition::Done => {}
            }
            state.acquisition = Acquisition::Pending;
        }

        info!("requesting camera and microphone");
        let result = self.source.user_media().await;

        let mut state = lock(&self.state);
        match result {
            Err(err) => {
                warn!(error = %err, "local media acquisition failed");
                state.acquisition = Acquisition::Failed(err.clone());
                Err(err)
            }
            Ok(media) => {
                if state.released {
                    drop(state);
                    media.audio.stop();
                    media.video.stop();
                    debug!("media arrived after release, discarded");
                    return Err(CallError::SessionClosed);
                }
                let bundle = LocalMediaBundle {
                    audio_track: media.audio,
                    video_track: media.video,
                    video_source: VideoSource::Camera,
                };
                state.bundle = Some(bundle.clone());
                state.acquisition = Acquisition::Done;
                info!(
                    audio = %bundle.audio_track.id(),
                    video = %bundle.video_track.id(),
                    "local media acquired"
                );
                Ok(bundle)
            }
        }
    }

    pub fn local_media(&self) -> Option<LocalMediaBundle> {
        lock(&self.state).bundle.clone()
    }

    pub fn toggle_audio(&self) -> bool {
        self.toggle(TrackKind::Audio)
    }

    pub fn toggle_video(&self) -> bool {
        self.toggle(TrackKind::Video)
    }

    fn toggle(&self, kind: TrackKind) -> bool {
        let state = lock(&self.state);
        let Some(bundle) = &state.bundle else {
            return false;
        };
        let track = match kind {
            TrackKind::Audio => &bundle.audio_track,
            TrackKind::Video => &bundle.video_track,
        };
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        debug!(?kind, enabled, "track toggled");
        enabled
    }

    pub fn is_sharing_screen(&self) -> bool {
        lock(&self.state)
            .bundle
            .as_ref()
            .is_some_and(|b| b.video_source == VideoSource::Screen)
    }

    /// Swap the outgoing video to a screen capture.
    ///
    /// Acquire, replace on the sender, then commit. Any failure before the commit
    /// leaves the camera in place and stops the capture track.
    pub async fn start_screen_share(&self, outgoing: Option<&dyn OutgoingVideo>) -> Result<()> {
        {
            let mut state = lock(&self.state);
            if state.released {
                return Err(CallError::SessionClosed);
            }
            let sharing = match &state.bundle {
                Some(bundle) => bundle.video_source == VideoSource::Screen,
                None => {
                    return Err(CallError::DeviceUnavailable(
                        "no local media to share from".into(),
                    ))
                }
            };
            if sharing {
                return Ok(());
            }
            if state.share_in_flight {
                return Err(CallError::ScreenShareDenied(
                    "a screen share change is already in progress".into(),
                ));
            }
            state.share_in_flight = true;
        }

        let screen = match self.source.display_media().await {
            Ok(track) => track,
            Err(err) => {
                lock(&self.state).share_in_flight = false;
                return Err(err);
            }
        };

        if lock(&self.state).released {
            screen.stop();
            return Err(CallError::SessionClosed);
        }

        if let Some(outgoing) = outgoing {
            if let Err(err) = outgoing
                .replace_outgoing_video_track(Arc::clone(&screen))
                .await
            {
                lock(&self.state).share_in_flight = false;
                screen.stop();
                return Err(err);
            }
        }

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.share_in_flight = false;
        match state.bundle.as_mut() {
            Some(bundle) if !state.released => {
                let camera = std::mem::replace(&mut bundle.video_track, Arc::clone(&screen));
                bundle.video_source = VideoSource::Screen;
                state.camera = Some(camera);
                info!(screen = %screen.id(), "screen share started");
                Ok(())
            }
            _ => {
                drop(guard);
                screen.stop();
                Err(CallError::SessionClosed)
            }
        }
    }

    /// Restore the camera track that was active before sharing
    pub async fn stop_screen_share(&self, outgoing: Option<&dyn OutgoingVideo>) -> Result<()> {
        let camera = {
            let mut state = lock(&self.state);
            if state.released {
                return Err(CallError::SessionClosed);
            }
            if state.share_in_flight {
                return Err(CallError::ScreenShareDenied(
                    "a screen share change is already in progress".into(),
                ));
            }
            let camera = match (&state.bundle, &state.camera) {
                (Some(bundle), Some(camera)) if bundle.video_source == VideoSource::Screen => {
                    Arc::clone(camera)
                }
                _ => return Err(CallError::NoPriorTrack),
            };
            state.share_in_flight = true;
            camera
        };

        if let Some(outgoing) = outgoing {
            if let Err(err) = outgoing
                .replace_outgoing_video_track(Arc::clone(&camera))
                .await
            {
                lock(&self.state).share_in_flight = false;
                return Err(err);
            }
        }

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.share_in_flight = false;
        if state.released {
            return Err(CallError::SessionClosed);
        }
        let screen = state.bundle.as_mut().map(|bundle| {
            bundle.video_source = VideoSource::Camera;
            std::mem::replace(&mut bundle.video_track, camera)
        });
        state.camera = None;
        drop(guard);

        if let Some(screen) = screen {
            screen.stop();
        }
        info!("screen share stopped, camera restored");
        Ok(())
    }

    /// Stop every local track. Safe to call repeatedly.
    pub fn release(&self) {
        let tracks: Vec<Arc<MediaTrack>> = {
            let mut state = lock(&self.state);
            if state.released {
                return;
            }
            state.released = true;
            let mut tracks = Vec::with_capacity(3);
            if let Some(bundle) = state.bundle.take() {
                tracks.push(bundle.audio_track);
                tracks.push(bundle.video_track);
            }
            if let Some(camera) = state.camera.take() {
                tracks.push(camera);
            }
            tracks
        };

        let stopped = tracks.iter().filter(|t| t.stop()).count();
        info!(stopped, "local media released");
    }

    pub fn is_released(&self) -> bool {
        lock(&self.state).released
    }

    /// Number of local tracks still live, including a parked camera
    pub fn live_tracks(&self) -> usize {
        let state = lock(&self.state);
        let bundle = state.bundle.iter().flat_map(|b| b.tracks());
        bundle
            .chain(state.camera.iter())
            .filter(|t| t.is_live())
            .count()
    }
}
