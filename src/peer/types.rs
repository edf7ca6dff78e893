use crate::media::TrackKind;
use crate::utils::sdp_digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Kind of session description
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// SDP body together with its kind, as browsers serialise it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn digest(&self) -> String {
        sdp_digest(&self.sdp)
    }
}

/// SDP payload with metadata
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SdpPayload {
    pub sdp: SessionDescription,
    /// Negotiation id of the sender
    pub id: String,
    pub ts: i64,
}

impl SdpPayload {
    pub fn new(sdp: SessionDescription, id: impl Into<String>) -> Self {
        Self {
            sdp,
            id: id.into(),
            ts: chrono::Utc::now().timestamp(),
        }
    }
}

/// ICE candidate exchanged over signaling
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
    /// Negotiation id of the sender
    #[serde(default)]
    pub connection_id: String,
}

/// ICE server configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Transport-level connectivity as reported by the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Facts raised by a transport, consumed by the session event loop
#[derive(Debug, Clone)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    GatheringComplete,
    RemoteTrack(RemoteTrack),
    StateChanged(TransportState),
}

/// A track received from the remote participant
#[derive(Clone)]
pub struct RemoteTrack {
    id: String,
    kind: TrackKind,
    stream_id: String,
    inner: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            stream_id: stream_id.into(),
            inner: None,
        }
    }

    pub fn from_webrtc(track: Arc<TrackRemote>) -> Self {
        let kind = match track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        };
        Self {
            id: track.id(),
            kind,
            stream_id: track.stream_id(),
            inner: Some(track),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The underlying webrtc track, for reading RTP
    pub fn webrtc_track(&self) -> Option<&Arc<TrackRemote>> {
        self.inner.as_ref()
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

/// Remote media as handed to the UI. Each value is an immutable snapshot.
#[derive(Debug, Clone)]
pub struct RemoteStream {
    id: String,
    tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn new(id: impl Into<String>, tracks: Vec<RemoteTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &RemoteTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &RemoteTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }
}
