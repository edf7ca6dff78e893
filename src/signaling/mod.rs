//! Room-scoped signaling between the two participants of a call
//!
//! Every message travels in a JSON envelope:
//! `{"type": "join"|"leave"|"offer"|"answer"|"ice-candidate", "room_id", "sender_id", "payload"}`

pub mod local;
pub mod websocket;

use crate::error::Result;
use crate::peer::types::{IceCandidate, SdpPayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use local::{LocalRelay, LocalSignalingChannel};
pub use websocket::WebSocketSignaling;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    pub room_id: String,
    pub sender_id: String,
    #[serde(flatten)]
    pub body: SignalBody,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum SignalBody {
    Join,
    Leave,
    Offer(SdpPayload),
    Answer(SdpPayload),
    IceCandidate(IceCandidate),
}

impl SignalingMessage {
    pub fn new(room_id: impl Into<String>, sender_id: impl Into<String>, body: SignalBody) -> Self {
        Self {
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            body,
        }
    }

    pub fn join(room_id: &str, sender_id: &str) -> Self {
        Self::new(room_id, sender_id, SignalBody::Join)
    }

    pub fn leave(room_id: &str, sender_id: &str) -> Self {
        Self::new(room_id, sender_id, SignalBody::Leave)
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self.body {
            SignalBody::Join => "join",
            SignalBody::Leave => "leave",
            SignalBody::Offer(_) => "offer",
            SignalBody::Answer(_) => "answer",
            SignalBody::IceCandidate(_) => "ice-candidate",
        }
    }
}

/// Messages addressed to one participant of one room.
///
/// The stream ends when the channel leaves the room or the relay drops it.
#[derive(Debug)]
pub struct Subscription {
    room_id: String,
    rx: mpsc::UnboundedReceiver<SignalingMessage>,
}

impl Subscription {
    pub fn new(room_id: impl Into<String>, rx: mpsc::UnboundedReceiver<SignalingMessage>) -> Self {
        Self {
            room_id: room_id.into(),
            rx,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub async fn recv(&mut self) -> Option<SignalingMessage> {
        self.rx.recv().await
    }

    /// Run `handler` for every message on a background task
    pub fn on_message<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(SignalingMessage) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(message) = self.rx.recv().await {
                handler(message);
            }
        })
    }
}

/// Duplex message channel to a signaling relay
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Subscribe to `room_id` as `participant_id`.
    ///
    /// The relay announces the join to the other participant. Fails with
    /// `SignalingUnavailable` when the relay cannot be reached.
    async fn join(&self, room_id: &str, participant_id: &str) -> Result<Subscription>;

    async fn send(&self, message: SignalingMessage) -> Result<()>;

    /// Leave the joined room. A no-op when not joined.
    async fn leave(&self) -> Result<()>;
}
