use crate::error::{CallError, Result};
use crate::signaling::{SignalingChannel, SignalingMessage, Subscription};
use crate::utils::lock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const ROOM_CAPACITY: usize = 2;

struct Member {
    participant_id: String,
    tx: mpsc::UnboundedSender<SignalingMessage>,
}

#[derive(Default)]
struct RelayState {
    rooms: HashMap<String, Vec<Member>>,
    offline: bool,
}

/// In-process signaling relay.
///
/// Fans messages out to the other member of a room, never back to the sender.
#[derive(Clone, Default)]
pub struct LocalRelay {
    state: Arc<Mutex<RelayState>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent join and publish fail
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    pub fn join(
        &self,
        room_id: &str,
        participant_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<SignalingMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = lock(&self.state);
            if state.offline {
                return Err(CallError::SignalingUnavailable("relay is offline".into()));
            }
            let members = state.rooms.entry(room_id.to_owned()).or_default();
            members.retain(|m| m.participant_id != participant_id);
            if members.len() >= ROOM_CAPACITY {
                warn!(room_id, participant_id, "room is full, join rejected");
                return Err(CallError::SignalingUnavailable(format!(
                    "room {room_id} already has {ROOM_CAPACITY} participants"
                )));
            }
            members.push(Member {
                participant_id: participant_id.to_owned(),
                tx,
            });
        }
        info!(room_id, participant_id, "participant joined");
        self.fan_out(SignalingMessage::join(room_id, participant_id));
        Ok(rx)
    }

    pub fn leave(&self, room_id: &str, participant_id: &str) {
        let removed = {
            let mut state = lock(&self.state);
            let Some(members) = state.rooms.get_mut(room_id) else {
                return;
            };
            let before = members.len();
            members.retain(|m| m.participant_id != participant_id);
            let removed = members.len() != before;
            if members.is_empty() {
                state.rooms.remove(room_id);
            }
            removed
        };
        if removed {
            info!(room_id, participant_id, "participant left");
            self.fan_out(SignalingMessage::leave(room_id, participant_id));
        }
    }

    /// Deliver `message` to the room, as if sent by `message.sender_id`.
    /// Returns the number of recipients.
    pub fn publish(&self, message: SignalingMessage) -> Result<usize> {
        if lock(&self.state).offline {
            return Err(CallError::SignalingUnavailable("relay is offline".into()));
        }
        Ok(self.fan_out(message))
    }

    /// Drop every subscription of a room without announcing a leave
    pub fn evict_room(&self, room_id: &str) {
        if lock(&self.state).rooms.remove(room_id).is_some() {
            warn!(room_id, "room evicted");
        }
    }

    pub fn participants(&self, room_id: &str) -> Vec<String> {
        lock(&self.state)
            .rooms
            .get(room_id)
            .map(|members| members.iter().map(|m| m.participant_id.clone()).collect())
            .unwrap_or_default()
    }

    fn fan_out(&self, message: SignalingMessage) -> usize {
        let state = lock(&self.state);
        let Some(members) = state.rooms.get(&message.room_id) else {
            return 0;
        };
        let mut delivered = 0;
        for member in members.iter().filter(|m| m.participant_id != message.sender_id) {
            if member.tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(
            room_id = %message.room_id,
            sender = %message.sender_id,
            kind = message.kind(),
            delivered,
            "relayed"
        );
        delivered
    }
}

/// [`SignalingChannel`] over a [`LocalRelay`]
pub struct LocalSignalingChannel {
    relay: LocalRelay,
    joined: Mutex<Option<(String, String)>>,
}

impl LocalSignalingChannel {
    pub fn new(relay: LocalRelay) -> Self {
        Self {
            relay,
            joined: Mutex::new(None),
        }
    }

    pub fn relay(&self) -> &LocalRelay {
        &self.relay
    }
}

#[async_trait]
impl SignalingChannel for LocalSignalingChannel {
    async fn join(&self, room_id: &str, participant_id: &str) -> Result<Subscription> {
        let previous = lock(&self.joined).take();
        if let Some((room, participant)) = previous {
            self.relay.leave(&room, &participant);
        }
        let rx = self.relay.join(room_id, participant_id)?;
        *lock(&self.joined) = Some((room_id.to_owned(), participant_id.to_owned()));
        Ok(Subscription::new(room_id, rx))
    }

    async fn send(&self, message: SignalingMessage) -> Result<()> {
        if lock(&self.joined).is_none() {
            return Err(CallError::SignalingUnavailable("not joined to a room".into()));
        }
        self.relay.publish(message).map(|_| ())
    }

    async fn leave(&self) -> Result<()> {
        let joined = lock(&self.joined).take();
        if let Some((room, participant)) = joined {
            self.relay.leave(&room, &participant);
        }
        Ok(())
    }
}
