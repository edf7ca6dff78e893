//! Call session core for two-party video calls over WebRTC.
//!
//! [`CallSessionController`] is the entry point: it acquires local media, joins a
//! signaling room, negotiates the peer connection and reports progress through
//! [`CallEvents`].

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod utils;

pub use config::CallConfig;
pub use controller::{CallSessionController, CallSessionControllerBuilder};
pub use error::{CallError, FailureReason, Result};
pub use events::{CallEvents, ParticipantEvent};
pub use media::{LocalMediaBundle, MediaSource, MediaTrack, MediaTrackController, VideoSource};
pub use peer::{PeerConnectionManager, RemoteStream, Transport, TransportFactory};
pub use session::{ConnectionState, Role, Session};
pub use signaling::{LocalRelay, LocalSignalingChannel, SignalingChannel, WebSocketSignaling};
