//! UI-facing callbacks and their ordered delivery

use crate::peer::types::RemoteStream;
use crate::session::ConnectionState;
use crate::utils::lock;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tracing::debug;

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantEvent {
    pub room_id: String,
    pub participant_id: String,
}

/// Callbacks registered before `initialize`.
///
/// They run on whichever task produced the event, with no internal lock held,
/// so a callback may call back into the controller.
#[derive(Default)]
pub struct CallEvents {
    user_joined: Option<Callback<ParticipantEvent>>,
    user_left: Option<Callback<ParticipantEvent>>,
    remote_stream: Option<Callback<RemoteStream>>,
    state_change: Option<Callback<ConnectionState>>,
}

impl CallEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_user_joined(mut self, f: impl Fn(ParticipantEvent) + Send + Sync + 'static) -> Self {
        self.user_joined = Some(Box::new(f));
        self
    }

    pub fn on_user_left(mut self, f: impl Fn(ParticipantEvent) + Send + Sync + 'static) -> Self {
        self.user_left = Some(Box::new(f));
        self
    }

    pub fn on_remote_stream(mut self, f: impl Fn(RemoteStream) + Send + Sync + 'static) -> Self {
        self.remote_stream = Some(Box::new(f));
        self
    }

    pub fn on_connection_state_change(
        mut self,
        f: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.state_change = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for CallEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallEvents")
            .field("user_joined", &self.user_joined.is_some())
            .field("user_left", &self.user_left.is_some())
            .field("remote_stream", &self.remote_stream.is_some())
            .field("state_change", &self.state_change.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Notification {
    UserJoined(ParticipantEvent),
    UserLeft(ParticipantEvent),
    RemoteStream(RemoteStream),
    StateChanged(ConnectionState),
}

#[derive(Default)]
struct NotifyQueue {
    pending: VecDeque<Notification>,
    draining: bool,
}

/// Delivers notifications in the order they were enqueued.
///
/// Producers enqueue while holding the call lock and flush after dropping it.
/// Only one flusher drains at a time; a flush that finds another drainer
/// returns at once and its notifications are delivered by that drainer.
pub(crate) struct Notifier {
    events: CallEvents,
    queue: Mutex<NotifyQueue>,
}

struct DrainGuard<'a>(&'a Mutex<NotifyQueue>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        // a panicking callback must not wedge delivery
        if std::thread::panicking() {
            lock(self.0).draining = false;
        }
    }
}

impl Notifier {
    pub fn new(events: CallEvents) -> Self {
        Self {
            events,
            queue: Mutex::new(NotifyQueue::default()),
        }
    }

    pub fn enqueue(&self, notification: Notification) {
        lock(&self.queue).pending.push_back(notification);
    }

    pub fn flush(&self) {
        {
            let mut queue = lock(&self.queue);
            if queue.draining || queue.pending.is_empty() {
                return;
            }
            queue.draining = true;
        }
        let _guard = DrainGuard(&self.queue);

        loop {
            let next = {
                let mut queue = lock(&self.queue);
                match queue.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.dispatch(next);
        }
    }

    fn dispatch(&self, notification: Notification) {
        debug!(?notification, "notify");
        match notification {
            Notification::UserJoined(event) => {
                if let Some(cb) = &self.events.user_joined {
                    cb(event);
                }
            }
            Notification::UserLeft(event) => {
                if let Some(cb) = &self.events.user_left {
                    cb(event);
                }
            }
            Notification::RemoteStream(stream) => {
                if let Some(cb) = &self.events.remote_stream {
                    cb(stream);
                }
            }
            Notification::StateChanged(state) => {
                if let Some(cb) = &self.events.state_change {
                    cb(state);
                }
            }
        }
    }
}
