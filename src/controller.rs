//! Root of the call core: owns the session state machine and wires media,
//! signaling and the peer connection together.

use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::events::{CallEvents, Notification, Notifier, ParticipantEvent};
use crate::media::{
    LocalMediaBundle, MediaSource, MediaTrackController, OutgoingVideo, SampleMediaSource,
};
use crate::peer::{
    PeerConnectionManager, PeerEvent, RemoteStream, TransportEvent, TransportFactory,
    WebRtcTransportFactory,
};
use crate::session::{ConnectionState, Role, Session};
use crate::signaling::{
    SignalBody, SignalingChannel, SignalingMessage, Subscription, WebSocketSignaling,
};
use crate::utils::lock;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Control {
    GraceExpired(u64),
    Shutdown,
}

enum LoopEvent {
    Signal(SignalingMessage),
    SignalingLost,
    Transport(TransportEvent),
    GraceExpired(u64),
}

struct ActiveCall {
    session: Session,
    media: Arc<MediaTrackController>,
    peer: Option<Arc<PeerConnectionManager>>,
    loop_tx: Option<mpsc::UnboundedSender<Control>>,
    loop_task: Option<JoinHandle<()>>,
    grace_task: Option<JoinHandle<()>>,
    joined: bool,
    tearing_down: bool,
    close_requested: bool,
}

impl ActiveCall {
    fn new(session: Session, media: Arc<MediaTrackController>) -> Self {
        Self {
            session,
            media,
            peer: None,
            loop_tx: None,
            loop_task: None,
            grace_task: None,
            joined: false,
            tearing_down: false,
            close_requested: false,
        }
    }

    fn take_resources(&mut self) -> Teardown {
        Teardown {
            media: Arc::clone(&self.media),
            peer: self.peer.clone(),
            loop_tx: self.loop_tx.take(),
            grace_task: self.grace_task.take(),
            leave_signaling: std::mem::take(&mut self.joined),
        }
    }
}

/// Everything a call holds that must be released on close or failure
struct Teardown {
    media: Arc<MediaTrackController>,
    peer: Option<Arc<PeerConnectionManager>>,
    loop_tx: Option<mpsc::UnboundedSender<Control>>,
    grace_task: Option<JoinHandle<()>>,
    leave_signaling: bool,
}

impl Teardown {
    async fn run(self, signaling: &dyn SignalingChannel) {
        self.media.release();
        if let Some(grace) = self.grace_task {
            grace.abort();
        }
        if let Some(tx) = self.loop_tx {
            let _ = tx.send(Control::Shutdown);
        }
        if let Some(peer) = self.peer {
            peer.close().await;
        }
        if self.leave_signaling {
            if let Err(e) = signaling.leave().await {
                warn!(error = %e, "failed to leave signaling room");
            }
        }
    }
}

struct Inner {
    config: CallConfig,
    signaling: Arc<dyn SignalingChannel>,
    media_source: Arc<dyn MediaSource>,
    transports: Arc<dyn TransportFactory>,
    notifier: Notifier,
    call: Mutex<Option<ActiveCall>>,
}

/// Moves the session to `next` and queues the notification.
/// Must be called with the call lock held.
fn transition(notifier: &Notifier, active: &mut ActiveCall, next: ConnectionState) -> bool {
    let moved = active.session.transition(next);
    if moved {
        notifier.enqueue(Notification::StateChanged(next));
    }
    moved
}

fn current<'a>(call: &'a mut Option<ActiveCall>, session_id: &str) -> Option<&'a mut ActiveCall> {
    call.as_mut().filter(|a| a.session.id == session_id)
}

fn current_live<'a>(
    call: &'a mut Option<ActiveCall>,
    session_id: &str,
) -> Option<&'a mut ActiveCall> {
    current(call, session_id).filter(|a| a.session.is_live() && !a.tearing_down)
}

impl Inner {
    fn is_live(&self, session_id: &str) -> bool {
        current_live(&mut lock(&self.call), session_id).is_some()
    }

    fn live_peer(&self, session_id: &str) -> Option<Arc<PeerConnectionManager>> {
        current_live(&mut lock(&self.call), session_id).and_then(|a| a.peer.clone())
    }

    /// Release everything, then report `Failed`
    async fn fail(&self, session_id: &str, err: CallError) {
        let reason = err.failure_reason();
        let teardown = {
            let mut call = lock(&self.call);
            let Some(active) = current_live(&mut call, session_id) else {
                return;
            };
            active.tearing_down = true;
            active.take_resources()
        };
        warn!(session = session_id, error = %err, ?reason, "call failed");

        teardown.run(self.signaling.as_ref()).await;

        {
            let mut call = lock(&self.call);
            if let Some(active) = current(&mut call, session_id) {
                active.tearing_down = false;
                transition(&self.notifier, active, ConnectionState::Failed(reason));
                if active.close_requested {
                    transition(&self.notifier, active, ConnectionState::Closed);
                }
            }
        }
        self.notifier.flush();
    }

    /// The `close()` transition. Safe from any state and when repeated.
    async fn close(&self) {
        let teardown = {
            let mut call = lock(&self.call);
            let Some(active) = call.as_mut() else {
                return;
            };
            if active.session.state.is_terminal() {
                return;
            }
            if active.tearing_down {
                active.close_requested = true;
                return;
            }
            transition(&self.notifier, active, ConnectionState::Closed);
            active.take_resources()
        };

        teardown.run(self.signaling.as_ref()).await;
        self.notifier.flush();
    }

    /// Returns false when the event loop should stop
    async fn handle(&self, session_id: &str, event: LoopEvent) -> bool {
        match event {
            LoopEvent::Signal(message) => self.on_signal(session_id, message).await,
            LoopEvent::Transport(event) => {
                self.on_transport_event(session_id, event).await;
                true
            }
            LoopEvent::GraceExpired(epoch) => {
                let expired = {
                    let mut call = lock(&self.call);
                    current_live(&mut call, session_id).is_some_and(|a| {
                        a.session.state == ConnectionState::Reconnecting
                            && a.session.reconnect_epoch == epoch
                    })
                };
                if expired {
                    self.fail(
                        session_id,
                        CallError::TransportFailed("connection did not recover in time".into()),
                    )
                    .await;
                }
                true
            }
            LoopEvent::SignalingLost => {
                if self.is_live(session_id) {
                    self.fail(
                        session_id,
                        CallError::SignalingUnavailable("signaling subscription ended".into()),
                    )
                    .await;
                }
                false
            }
        }
    }

    async fn on_signal(&self, session_id: &str, message: SignalingMessage) -> bool {
        debug!(kind = message.kind(), from = %message.sender_id, "signaling message");
        let sender = message.sender_id;
        match message.body {
            SignalBody::Join => {
                self.on_peer_joined(session_id, &sender).await;
                true
            }
            SignalBody::Leave => !self.on_peer_left(session_id, &sender).await,
            SignalBody::Offer(payload) => {
                if !self.on_peer_present(session_id, &sender) {
                    return true;
                }
                let Some(peer) = self.live_peer(session_id) else {
                    return true;
                };
                if let Err(e) = peer.on_remote_offer(payload).await {
                    self.negotiation_error(session_id, e).await;
                }
                true
            }
            SignalBody::Answer(payload) => {
                if !self.is_remote(session_id, &sender) {
                    return true;
                }
                let Some(peer) = self.live_peer(session_id) else {
                    return true;
                };
                if let Err(e) = peer.on_remote_answer(payload).await {
                    self.negotiation_error(session_id, e).await;
                }
                true
            }
            SignalBody::IceCandidate(candidate) => {
                // may precede the first offer when we joined second
                if !self.on_peer_present(session_id, &sender) {
                    return true;
                }
                if let Some(peer) = self.live_peer(session_id) {
                    peer.on_remote_ice_candidate(candidate).await;
                }
                true
            }
        }
    }

    async fn negotiation_error(&self, session_id: &str, err: CallError) {
        if err == CallError::SessionClosed {
            debug!("negotiation abandoned, call already closed");
            return;
        }
        self.fail(session_id, err).await;
    }

    /// Accept `sender` as the remote participant unless another one already is
    fn adopt_remote(&self, active: &mut ActiveCall, sender: &str) -> bool {
        match &active.session.remote_participant_id {
            Some(remote) if remote != sender => {
                warn!(
                    room_id = %active.session.room_id,
                    participant = sender,
                    "ignoring third participant"
                );
                false
            }
            Some(_) => true,
            None => {
                active.session.remote_participant_id = Some(sender.to_owned());
                self.notifier.enqueue(Notification::UserJoined(ParticipantEvent {
                    room_id: active.session.room_id.clone(),
                    participant_id: sender.to_owned(),
                }));
                true
            }
        }
    }

    fn is_remote(&self, session_id: &str, sender: &str) -> bool {
        let mut call = lock(&self.call);
        current_live(&mut call, session_id)
            .is_some_and(|a| a.session.remote_participant_id.as_deref() == Some(sender))
    }

    /// An offer or candidate from the peer implies it joined
    fn on_peer_present(&self, session_id: &str, sender: &str) -> bool {
        let accepted = {
            let mut call = lock(&self.call);
            let Some(active) = current_live(&mut call, session_id) else {
                return false;
            };
            let accepted = self.adopt_remote(active, sender);
            if accepted && active.session.state == ConnectionState::AwaitingPeer {
                transition(&self.notifier, active, ConnectionState::Negotiating);
            }
            accepted
        };
        self.notifier.flush();
        accepted
    }

    async fn on_peer_joined(&self, session_id: &str, sender: &str) {
        let (role, advanced, peer, tracks, room_id, local_id) = {
            let mut call = lock(&self.call);
            let Some(active) = current_live(&mut call, session_id) else {
                return;
            };
            if !self.adopt_remote(active, sender) {
                return;
            }
            let advanced = active.session.state == ConnectionState::AwaitingPeer
                && transition(&self.notifier, active, ConnectionState::Negotiating);
            let tracks = active
                .media
                .local_media()
                .map(|b| b.tracks().into_iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            (
                active.session.role,
                advanced,
                active.peer.clone(),
                tracks,
                active.session.room_id.clone(),
                active.session.local_participant_id.clone(),
            )
        };
        self.notifier.flush();

        match role {
            Role::Responder => {
                // announce ourselves so the initiator learns we are here
                if let Err(e) = self
                    .signaling
                    .send(SignalingMessage::join(&room_id, &local_id))
                    .await
                {
                    warn!(error = %e, "failed to announce presence");
                }
            }
            Role::Initiator if advanced => {
                let Some(peer) = peer else {
                    return;
                };
                if let Err(e) = peer.create_as_initiator(tracks).await {
                    self.negotiation_error(session_id, e).await;
                }
            }
            Role::Initiator => debug!(participant = sender, "peer re-announced"),
        }
    }

    /// Returns whether the call was closed
    async fn on_peer_left(&self, session_id: &str, sender: &str) -> bool {
        {
            let mut call = lock(&self.call);
            let Some(active) = current_live(&mut call, session_id) else {
                return false;
            };
            if active.session.remote_participant_id.as_deref() != Some(sender) {
                debug!(participant = sender, "leave from unknown participant ignored");
                return false;
            }
            self.notifier.enqueue(Notification::UserLeft(ParticipantEvent {
                room_id: active.session.room_id.clone(),
                participant_id: sender.to_owned(),
            }));
        }
        info!(participant = sender, "remote participant left, closing call");
        self.close().await;
        true
    }

    async fn on_transport_event(&self, session_id: &str, event: TransportEvent) {
        let Some(peer) = self.live_peer(session_id) else {
            return;
        };
        let Some(fact) = peer.handle_transport_event(event).await else {
            return;
        };

        match fact {
            PeerEvent::RemoteStreamReceived(stream) => {
                {
                    let mut call = lock(&self.call);
                    let Some(active) = current_live(&mut call, session_id) else {
                        return;
                    };
                    active.session.remote_stream_received = true;
                    self.notifier.enqueue(Notification::RemoteStream(stream));
                    try_connect(&self.notifier, active);
                }
                self.notifier.flush();
            }
            PeerEvent::ConnectionStateChanged(ConnectionState::Connected) => {
                {
                    let mut call = lock(&self.call);
                    let Some(active) = current_live(&mut call, session_id) else {
                        return;
                    };
                    active.session.transport_connected = true;
                    match active.session.state {
                        ConnectionState::Negotiating => try_connect(&self.notifier, active),
                        ConnectionState::Reconnecting => {
                            if let Some(grace) = active.grace_task.take() {
                                grace.abort();
                            }
                            info!("transport recovered");
                            transition(&self.notifier, active, ConnectionState::Connected);
                        }
                        _ => {}
                    }
                }
                self.notifier.flush();
            }
            PeerEvent::ConnectionStateChanged(ConnectionState::Reconnecting) => {
                let reconnecting = {
                    let mut call = lock(&self.call);
                    let Some(active) = current_live(&mut call, session_id) else {
                        return;
                    };
                    active.session.transport_connected = false;
                    if active.session.state == ConnectionState::Connected
                        && transition(&self.notifier, active, ConnectionState::Reconnecting)
                    {
                        self.start_grace_timer(active);
                        true
                    } else {
                        false
                    }
                };
                self.notifier.flush();
                if reconnecting {
                    if let Err(e) = peer.restart_ice().await {
                        warn!(error = %e, "ICE restart failed");
                    }
                }
            }
            PeerEvent::ConnectionStateChanged(ConnectionState::Failed(_)) => {
                self.fail(
                    session_id,
                    CallError::TransportFailed("peer connection failed".into()),
                )
                .await;
            }
            PeerEvent::ConnectionStateChanged(ConnectionState::Closed) => {
                self.fail(
                    session_id,
                    CallError::TransportFailed("peer connection closed unexpectedly".into()),
                )
                .await;
            }
            PeerEvent::ConnectionStateChanged(other) => {
                debug!(state = %other, "transport progress");
            }
        }
    }

    fn start_grace_timer(&self, active: &mut ActiveCall) {
        let Some(tx) = active.loop_tx.clone() else {
            return;
        };
        let epoch = active.session.reconnect_epoch;
        let grace = self.config.reconnect_grace();
        info!(grace_ms = grace.as_millis() as u64, epoch, "transport lost, grace period started");
        if let Some(previous) = active.grace_task.replace(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(Control::GraceExpired(epoch));
        })) {
            previous.abort();
        }
    }
}

fn try_connect(notifier: &Notifier, active: &mut ActiveCall) {
    let session = &active.session;
    if session.state == ConnectionState::Negotiating
        && session.remote_stream_received
        && session.transport_connected
    {
        transition(notifier, active, ConnectionState::Connected);
    }
}

async fn run_event_loop(
    inner: Weak<Inner>,
    session_id: String,
    mut subscription: Subscription,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) {
    let mut transport_open = true;
    loop {
        let event = tokio::select! {
            biased;
            control = control_rx.recv() => match control {
                Some(Control::GraceExpired(epoch)) => LoopEvent::GraceExpired(epoch),
                Some(Control::Shutdown) | None => break,
            },
            message = subscription.recv() => match message {
                Some(message) => LoopEvent::Signal(message),
                None => LoopEvent::SignalingLost,
            },
            event = transport_rx.recv(), if transport_open => match event {
                Some(event) => LoopEvent::Transport(event),
                None => {
                    transport_open = false;
                    continue;
                }
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.handle(&session_id, event).await {
            break;
        }
    }
    debug!(session = %session_id, "event loop finished");
}

/// Builder for [`CallSessionController`]
#[derive(Default)]
pub struct CallSessionControllerBuilder {
    config: Option<CallConfig>,
    signaling: Option<Arc<dyn SignalingChannel>>,
    media_source: Option<Arc<dyn MediaSource>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    events: CallEvents,
}

impl CallSessionControllerBuilder {
    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn signaling(mut self, signaling: Arc<dyn SignalingChannel>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    pub fn media_source(mut self, source: Arc<dyn MediaSource>) -> Self {
        self.media_source = Some(source);
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    pub fn events(mut self, events: CallEvents) -> Self {
        self.events = events;
        self
    }

    /// Falls back to a WebSocket relay when only `signaling_url` is configured
    pub fn build(self) -> Result<CallSessionController> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let signaling = match (self.signaling, &config.signaling_url) {
            (Some(signaling), _) => signaling,
            (None, Some(url)) => Arc::new(WebSocketSignaling::new(url.clone())),
            (None, None) => {
                return Err(CallError::InvalidConfig(
                    "a signaling channel or signaling_url is required".into(),
                ))
            }
        };

        Ok(CallSessionController {
            inner: Arc::new(Inner {
                config,
                signaling,
                media_source: self
                    .media_source
                    .unwrap_or_else(|| Arc::new(SampleMediaSource::new())),
                transports: self
                    .transport_factory
                    .unwrap_or_else(|| Arc::new(WebRtcTransportFactory)),
                notifier: Notifier::new(self.events),
                call: Mutex::new(None),
            }),
        })
    }
}

/// Public entry point for the UI layer.
///
/// One controller runs at most one call at a time; a failed or closed call is
/// replaced by the next `initialize`.
pub struct CallSessionController {
    inner: Arc<Inner>,
}

impl CallSessionController {
    pub fn builder() -> CallSessionControllerBuilder {
        CallSessionControllerBuilder::default()
    }

    /// Open a call: acquire media, join the room and prepare the peer connection.
    ///
    /// Fatal errors move the session to `Failed` before returning.
    pub async fn initialize(&self, role: Role, participant_id: &str, room_id: &str) -> Result<()> {
        let inner = &self.inner;
        let media = Arc::new(MediaTrackController::new(Arc::clone(&inner.media_source)));

        let session_id = {
            let mut call = lock(&inner.call);
            if let Some(active) = call.as_ref() {
                if active.session.is_live() || active.tearing_down {
                    return Err(CallError::SessionActive);
                }
            }
            let session = Session::new(role, participant_id, room_id);
            let session_id = session.id.clone();
            info!(session = %session_id, ?role, room_id, participant_id, "initializing call");
            let active = call.insert(ActiveCall::new(session, Arc::clone(&media)));
            transition(&inner.notifier, active, ConnectionState::Initializing);
            session_id
        };
        inner.notifier.flush();

        let bundle = match media.acquire_local_media().await {
            Ok(bundle) => bundle,
            Err(CallError::SessionClosed) => return Err(CallError::SessionClosed),
            Err(e) => {
                inner.fail(&session_id, e.clone()).await;
                return Err(e);
            }
        };

        if !self.advance(&session_id, ConnectionState::AwaitingPeer) {
            media.release();
            return Err(CallError::SessionClosed);
        }

        let subscription = match inner.signaling.join(room_id, participant_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                let e = match e {
                    CallError::SignalingUnavailable(_) => e,
                    other => CallError::SignalingUnavailable(other.to_string()),
                };
                inner.fail(&session_id, e.clone()).await;
                return Err(e);
            }
        };

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let peer = Arc::new(PeerConnectionManager::new(
            role,
            room_id,
            participant_id,
            Arc::clone(&inner.signaling),
            Arc::clone(&inner.transports),
            inner.config.clone(),
            transport_tx,
        ));

        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let attached = {
            let mut call = lock(&inner.call);
            match current_live(&mut call, &session_id) {
                Some(active) => {
                    if role == Role::Responder {
                        // the bundle may already carry a committed screen share
                        let tracks = active
                            .media
                            .local_media()
                            .unwrap_or(bundle)
                            .tracks()
                            .into_iter()
                            .cloned()
                            .collect();
                        peer.create_as_responder(tracks);
                    }
                    active.joined = true;
                    active.peer = Some(Arc::clone(&peer));
                    active.loop_tx = Some(loop_tx);
                    active.loop_task = Some(tokio::spawn(run_event_loop(
                        Arc::downgrade(inner),
                        session_id.clone(),
                        subscription,
                        transport_rx,
                        loop_rx,
                    )));
                    true
                }
                None => false,
            }
        };

        if !attached {
            debug!(session = %session_id, "closed while joining, leaving room");
            if let Err(e) = inner.signaling.leave().await {
                warn!(error = %e, "failed to leave signaling room");
            }
            return Err(CallError::SessionClosed);
        }

        info!(session = %session_id, negotiation_id = %peer.negotiation_id(), "waiting for peer");
        Ok(())
    }

    fn advance(&self, session_id: &str, next: ConnectionState) -> bool {
        let moved = {
            let mut call = lock(&self.inner.call);
            match current_live(&mut call, session_id) {
                Some(active) => transition(&self.inner.notifier, active, next),
                None => false,
            }
        };
        self.inner.notifier.flush();
        moved
    }

    fn media(&self) -> Option<Arc<MediaTrackController>> {
        lock(&self.inner.call).as_ref().map(|a| Arc::clone(&a.media))
    }

    pub fn local_stream(&self) -> Option<LocalMediaBundle> {
        self.media().and_then(|m| m.local_media())
    }

    pub fn remote_stream(&self) -> Option<RemoteStream> {
        let call = lock(&self.inner.call);
        let active = call.as_ref().filter(|a| !a.session.state.is_terminal())?;
        active.peer.as_ref().and_then(|p| p.remote_stream())
    }

    pub fn toggle_audio(&self) -> bool {
        self.media().is_some_and(|m| m.toggle_audio())
    }

    pub fn toggle_video(&self) -> bool {
        self.media().is_some_and(|m| m.toggle_video())
    }

    pub fn is_sharing_screen(&self) -> bool {
        self.media().is_some_and(|m| m.is_sharing_screen())
    }

    /// Share the screen in place of the camera. Failures leave the call as it was.
    pub async fn start_screen_share(&self) -> bool {
        let Some((media, peer)) = self.live_media_and_peer() else {
            return false;
        };
        let outgoing = peer.as_deref().map(|p| p as &dyn OutgoingVideo);
        match media.start_screen_share(outgoing).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "screen share not started");
                false
            }
        }
    }

    pub async fn stop_screen_share(&self) -> bool {
        let Some((media, peer)) = self.live_media_and_peer() else {
            return false;
        };
        let outgoing = peer.as_deref().map(|p| p as &dyn OutgoingVideo);
        match media.stop_screen_share(outgoing).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "screen share not stopped");
                false
            }
        }
    }

    fn live_media_and_peer(
        &self,
    ) -> Option<(Arc<MediaTrackController>, Option<Arc<PeerConnectionManager>>)> {
        let call = lock(&self.inner.call);
        let active = call.as_ref().filter(|a| a.session.is_live())?;
        Some((Arc::clone(&active.media), active.peer.clone()))
    }

    /// Close the call. Safe when nothing was opened and when repeated.
    pub async fn cleanup(&self) {
        self.inner.close().await;
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.call)
            .as_ref()
            .map(|a| a.session.state)
            .unwrap_or(ConnectionState::Idle)
    }

    /// Snapshot of the current session, including the duration timer
    pub fn session(&self) -> Option<Session> {
        lock(&self.inner.call).as_ref().map(|a| a.session.clone())
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        let Some(mut active) = lock(&self.inner.call).take() else {
            return;
        };
        if active.session.state.is_terminal() {
            return;
        }
        debug!(session = %active.session.id, "controller dropped with an open call");
        if let Some(task) = active.loop_task.take() {
            task.abort();
        }
        let teardown = active.take_resources();
        teardown.media.release();

        let signaling = Arc::clone(&self.inner.signaling);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                teardown.run(signaling.as_ref()).await;
            });
        }
    }
}
