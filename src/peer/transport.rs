use crate::config::CallConfig;
use crate::error::Result;
use crate::media::MediaTrack;
use crate::peer::types::{IceCandidate, SessionDescription, TransportEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Where a transport reports candidates, remote tracks and state changes
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Outcome of swapping the outgoing video track in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackReplacement {
    /// The sender now carries the new track, no renegotiation needed
    InPlace,
    /// The sender cannot swap tracks; the caller has to renegotiate
    Unsupported,
}

/// A peer-to-peer media transport.
///
/// Mirrors the subset of the peer connection API the call core relies on.
/// Implementations must report every fact through the [`TransportEvents`]
/// sender they were created with and never call back into the caller directly.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn add_track(&self, track: Arc<MediaTrack>) -> Result<()>;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn replace_video_track(&self, track: Arc<MediaTrack>) -> Result<TrackReplacement>;

    /// Detach the current video sender and attach `track` on a new one
    async fn reattach_video_track(&self, track: Arc<MediaTrack>) -> Result<()>;

    async fn close(&self);
}

/// Builds one transport per call attempt
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, config: &CallConfig, events: TransportEvents)
        -> Result<Arc<dyn Transport>>;
}
