use crate::error::{CallError, Result};
use crate::utils::random_id;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Where the outgoing video comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    Camera,
    Screen,
}

/// A local capture track.
///
/// `enabled` is the mute switch and keeps the track attached to its sender.
/// Once stopped a track is dead for good.
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    live: AtomicBool,
    rtp: Arc<TrackLocalStaticSample>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>, rtp: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            id: rtp.id().to_string(),
            kind,
            label: label.into(),
            enabled: AtomicBool::new(true),
            live: AtomicBool::new(true),
            rtp,
        }
    }

    /// Opus sample track
    pub fn audio(label: impl Into<String>, stream_id: &str) -> Self {
        let rtp = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            format!("audio-{}", random_id()),
            stream_id.to_owned(),
        );
        Self::new(TrackKind::Audio, label, Arc::new(rtp))
    }

    /// VP8 sample track
    pub fn video(label: impl Into<String>, stream_id: &str) -> Self {
        let rtp = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            format!("video-{}", random_id()),
            stream_id.to_owned(),
        );
        Self::new(TrackKind::Video, label, Arc::new(rtp))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track. Returns whether it was still live.
    pub fn stop(&self) -> bool {
        self.live.swap(false, Ordering::SeqCst)
    }

    /// The RTP track attached to a peer connection sender
    pub fn rtp(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.rtp)
    }

    /// Push one encoded frame. Muted or stopped tracks drop it.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        if !self.is_live() || !self.is_enabled() {
            return Ok(());
        }
        self.rtp
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| CallError::TransportFailed(format!("failed to write sample: {e}")))
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Local camera/microphone (or screen) tracks of the current call
#[derive(Debug, Clone)]
pub struct LocalMediaBundle {
    pub audio_track: Arc<MediaTrack>,
    pub video_track: Arc<MediaTrack>,
    pub video_source: VideoSource,
}

impl LocalMediaBundle {
    pub fn tracks(&self) -> [&Arc<MediaTrack>; 2] {
        [&self.audio_track, &self.video_track]
    }
}
