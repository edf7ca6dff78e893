//! Error types for the call session core

use serde::{Deserialize, Serialize};

/// Result type alias using [`CallError`]
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors that can occur while setting up or running a call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// The user refused camera/microphone access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The signaling relay could not be reached or dropped the subscription
    #[error("Signaling unavailable: {0}")]
    SignalingUnavailable(String),

    /// SDP offer/answer exchange failed
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The user cancelled the screen capture picker
    #[error("Screen share denied: {0}")]
    ScreenShareDenied(String),

    /// Stop screen share was requested while not sharing
    #[error("No prior camera track to restore")]
    NoPriorTrack,

    /// The peer transport failed and did not recover
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `initialize` was called while a call is still open
    #[error("A call session is already active")]
    SessionActive,

    /// The session was closed while the operation was in flight
    #[error("Call session closed")]
    SessionClosed,
}

/// Why a session ended up in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    PermissionDenied,
    DeviceUnavailable,
    SignalingUnavailable,
    NegotiationFailed,
    TransportFailed,
}

impl CallError {
    /// Map this error onto the reason reported with `Failed`.
    ///
    /// Anything that is not a media, signaling or transport error counts as a
    /// negotiation failure so no error can leave the state machine stuck.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            CallError::PermissionDenied(_) => FailureReason::PermissionDenied,
            CallError::DeviceUnavailable(_) => FailureReason::DeviceUnavailable,
            CallError::SignalingUnavailable(_) => FailureReason::SignalingUnavailable,
            CallError::TransportFailed(_) => FailureReason::TransportFailed,
            _ => FailureReason::NegotiationFailed,
        }
    }

}
