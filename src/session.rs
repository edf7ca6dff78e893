use crate::error::FailureReason;
use crate::utils::random_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Which side of the call creates the first offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Initializing,
    AwaitingPeer,
    Negotiating,
    Connected,
    Reconnecting,
    Failed(FailureReason),
    Closed,
}

impl ConnectionState {
    /// `Closed` accepts no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed(_))
    }

    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Initializing) => true,
            (Initializing, AwaitingPeer) | (Initializing, Failed(_)) => true,
            (AwaitingPeer, Negotiating) | (AwaitingPeer, Failed(_)) => true,
            (Negotiating, Connected) | (Negotiating, Failed(_)) => true,
            (Connected, Reconnecting) | (Connected, Failed(_)) => true,
            (Reconnecting, Connected) | (Reconnecting, Failed(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Failed(reason) => write!(f, "failed({reason:?})"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// One call attempt, from `initialize` until `Closed`
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub room_id: String,
    pub local_participant_id: String,
    pub role: Role,
    pub state: ConnectionState,
    pub remote_participant_id: Option<String>,
    pub remote_stream_received: bool,
    pub transport_connected: bool,
    /// Wall-clock time the call first reached `Connected`
    pub connected_at: Option<DateTime<Utc>>,
    /// Bumped on every entry to `Reconnecting`; stale grace timers compare against it
    pub reconnect_epoch: u64,
    connected_since: Option<Instant>,
    ended_at: Option<Instant>,
}

impl Session {
    pub fn new(role: Role, local_participant_id: &str, room_id: &str) -> Self {
        Self {
            id: random_id(),
            room_id: room_id.to_owned(),
            local_participant_id: local_participant_id.to_owned(),
            role,
            state: ConnectionState::Idle,
            remote_participant_id: None,
            remote_stream_received: false,
            transport_connected: false,
            connected_at: None,
            reconnect_epoch: 0,
            connected_since: None,
            ended_at: None,
        }
    }

    /// Move to `next`. Returns false, leaving the state untouched, when the
    /// transition is not allowed or is a self-transition.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next || !self.state.can_transition_to(next) {
            if self.state != next {
                warn!(session = %self.id, from = %self.state, to = %next, "rejected state transition");
            }
            return false;
        }

        info!(session = %self.id, from = %self.state, to = %next, "state transition");
        match next {
            ConnectionState::Connected if self.connected_since.is_none() => {
                self.connected_since = Some(Instant::now());
                self.connected_at = Some(Utc::now());
            }
            ConnectionState::Reconnecting => {
                self.reconnect_epoch += 1;
                self.transport_connected = false;
            }
            ConnectionState::Failed(_) | ConnectionState::Closed => {
                if self.connected_since.is_some() && self.ended_at.is_none() {
                    self.ended_at = Some(Instant::now());
                }
            }
            _ => {}
        }
        self.state = next;
        true
    }

    /// Live until it fails or closes
    pub fn is_live(&self) -> bool {
        !self.state.is_terminal() && !self.state.is_failed()
    }

    /// Time spent since first connecting, frozen once the call ends
    pub fn call_duration(&self) -> Option<Duration> {
        let since = self.connected_since?;
        let until = self.ended_at.unwrap_or_else(Instant::now);
        Some(until.saturating_duration_since(since))
    }
}
