//! Shared doubles for call-core integration tests
//!
//! Transports and media sources are in-memory fakes; signaling runs over the
//! in-process relay so a test can play the remote participant directly.

#![allow(dead_code)]

use async_trait::async_trait;
use callcore::config::CallConfig;
use callcore::error::{CallError, Result};
use callcore::events::{CallEvents, ParticipantEvent};
use callcore::media::{MediaSource, MediaTrack, UserMedia};
use callcore::peer::{
    IceCandidate, RemoteStream, SessionDescription, TrackReplacement, Transport, TransportEvent,
    TransportEvents, TransportFactory,
};
use callcore::session::ConnectionState;
use callcore::signaling::{LocalRelay, LocalSignalingChannel, SignalBody, SignalingMessage};
use callcore::CallSessionController;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

pub const ROOM: &str = "interview-42";
pub const LOCAL: &str = "alice";
pub const REMOTE: &str = "bob";

pub fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

/// Let spawned tasks run until `cond` holds
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

pub struct FakeTransport {
    events: TransportEvents,
    calls: Mutex<Vec<String>>,
    replacement: TrackReplacement,
    video: Mutex<Option<Arc<MediaTrack>>>,
    closed: AtomicBool,
    offers: AtomicUsize,
    gate: Option<Arc<Notify>>,
    stalled: Arc<AtomicUsize>,
}

impl FakeTransport {
    /// Hold negotiation steps until the test releases the gate
    async fn pause(&self) {
        if let Some(gate) = &self.gate {
            self.stalled.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        locked(&self.calls)
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn video_track(&self) -> Option<Arc<MediaTrack>> {
        locked(&self.video).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        locked(&self.calls).push(call);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn add_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        self.record(format!("add_track:{}", track.label()));
        if track.kind() == callcore::media::TrackKind::Video {
            *locked(&self.video) = Some(track);
        }
        Ok(())
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        self.pause().await;
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        self.record(format!("create_offer:{ice_restart}"));
        Ok(SessionDescription::offer(format!(
            "v=0 offer-{n} restart={ice_restart}"
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record("create_answer".into());
        Ok(SessionDescription::answer("v=0 answer"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(format!("set_local:{:?}", desc.sdp_type).to_lowercase());
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pause().await;
        if desc.sdp.contains("malformed") {
            return Err(CallError::NegotiationFailed("unparseable SDP".into()));
        }
        self.record(format!("set_remote:{:?}", desc.sdp_type).to_lowercase());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(format!("candidate:{}", candidate.candidate));
        Ok(())
    }

    async fn replace_video_track(&self, track: Arc<MediaTrack>) -> Result<TrackReplacement> {
        self.record(format!("replace:{}", track.label()));
        if self.replacement == TrackReplacement::InPlace {
            *locked(&self.video) = Some(track);
        }
        Ok(self.replacement)
    }

    async fn reattach_video_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        self.record(format!("reattach:{}", track.label()));
        *locked(&self.video) = Some(track);
        Ok(())
    }

    async fn close(&self) {
        self.record("close".into());
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeTransportFactory {
    replacement: TrackReplacement,
    created: Mutex<Vec<Arc<FakeTransport>>>,
    fail_with: Option<CallError>,
    gate: Option<Arc<Notify>>,
    stalled: Arc<AtomicUsize>,
}

impl FakeTransportFactory {
    pub fn new() -> Self {
        Self::with_replacement(TrackReplacement::InPlace)
    }

    pub fn with_replacement(replacement: TrackReplacement) -> Self {
        Self {
            replacement,
            created: Mutex::new(Vec::new()),
            fail_with: None,
            gate: None,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every `create` returns `err`
    pub fn failing(err: CallError) -> Self {
        Self {
            fail_with: Some(err),
            ..Self::new()
        }
    }

    /// Transports block in `create_offer` and `set_remote_description`
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    /// Negotiation steps that reached the gate
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<Arc<FakeTransport>> {
        locked(&self.created).last().cloned()
    }

    pub fn created(&self) -> usize {
        locked(&self.created).len()
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        _config: &CallConfig,
        events: TransportEvents,
    ) -> Result<Arc<dyn Transport>> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        let transport = Arc::new(FakeTransport {
            events,
            calls: Mutex::new(Vec::new()),
            replacement: self.replacement,
            video: Mutex::new(None),
            closed: AtomicBool::new(false),
            offers: AtomicUsize::new(0),
            gate: self.gate.clone(),
            stalled: Arc::clone(&self.stalled),
        });
        locked(&self.created).push(Arc::clone(&transport));
        Ok(transport)
    }
}

#[derive(Default)]
pub struct FakeMediaSource {
    pub deny: Option<CallError>,
    pub deny_screen: bool,
    pub gate: Option<Arc<Notify>>,
    pub screen_gate: Option<Arc<Notify>>,
    pub prompts: AtomicUsize,
    pub screen_prompts: AtomicUsize,
    pub produced: Mutex<Vec<Arc<MediaTrack>>>,
}

impl FakeMediaSource {
    pub fn live_tracks(&self) -> usize {
        locked(&self.produced).iter().filter(|t| t.is_live()).count()
    }
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn user_media(&self) -> Result<UserMedia> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(err) = &self.deny {
            return Err(err.clone());
        }
        let media = UserMedia {
            audio: Arc::new(MediaTrack::audio("microphone", "local")),
            video: Arc::new(MediaTrack::video("camera", "local")),
        };
        let mut produced = locked(&self.produced);
        produced.push(Arc::clone(&media.audio));
        produced.push(Arc::clone(&media.video));
        Ok(media)
    }

    async fn display_media(&self) -> Result<Arc<MediaTrack>> {
        self.screen_prompts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.screen_gate {
            gate.notified().await;
        }
        if self.deny_screen {
            return Err(CallError::ScreenShareDenied("picker cancelled".into()));
        }
        let screen = Arc::new(MediaTrack::video("screen", "local"));
        locked(&self.produced).push(Arc::clone(&screen));
        Ok(screen)
    }
}

/// What the UI callbacks observed
#[derive(Default)]
pub struct Observed {
    pub states: Mutex<Vec<ConnectionState>>,
    pub joined: Mutex<Vec<ParticipantEvent>>,
    pub left: Mutex<Vec<ParticipantEvent>>,
    pub streams: Mutex<Vec<RemoteStream>>,
}

impl Observed {
    pub fn states(&self) -> Vec<ConnectionState> {
        locked(&self.states).clone()
    }

    pub fn last_state(&self) -> Option<ConnectionState> {
        locked(&self.states).last().copied()
    }
}

pub struct Harness {
    pub relay: LocalRelay,
    pub factory: Arc<FakeTransportFactory>,
    pub media: Arc<FakeMediaSource>,
    pub observed: Arc<Observed>,
    pub controller: CallSessionController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(
            FakeMediaSource::default(),
            FakeTransportFactory::new(),
            CallConfig::default(),
        )
    }

    pub fn with(media: FakeMediaSource, factory: FakeTransportFactory, config: CallConfig) -> Self {
        let relay = LocalRelay::new();
        let factory = Arc::new(factory);
        let media = Arc::new(media);
        let observed = Arc::new(Observed::default());

        let events = {
            let (s, j, l, r) = (
                Arc::clone(&observed),
                Arc::clone(&observed),
                Arc::clone(&observed),
                Arc::clone(&observed),
            );
            CallEvents::new()
                .on_connection_state_change(move |state| locked(&s.states).push(state))
                .on_user_joined(move |e| locked(&j.joined).push(e))
                .on_user_left(move |e| locked(&l.left).push(e))
                .on_remote_stream(move |stream| locked(&r.streams).push(stream))
        };

        let controller = CallSessionController::builder()
            .config(config)
            .signaling(Arc::new(LocalSignalingChannel::new(relay.clone())))
            .media_source(media.clone())
            .transport_factory(factory.clone())
            .events(events)
            .build()
            .unwrap();

        Self {
            relay,
            factory,
            media,
            observed,
            controller,
        }
    }

    pub fn transport(&self) -> Arc<FakeTransport> {
        self.factory.last().expect("no transport created")
    }

    /// Join the room as the remote participant
    pub fn remote_joins(&self) -> mpsc::UnboundedReceiver<SignalingMessage> {
        self.relay.join(ROOM, REMOTE).unwrap()
    }

    pub fn remote_sends(&self, body: SignalBody) {
        self.relay
            .publish(SignalingMessage::new(ROOM, REMOTE, body))
            .unwrap();
    }

    pub async fn wait_for_state(&self, state: ConnectionState) {
        let observed = Arc::clone(&self.observed);
        eventually(move || observed.last_state() == Some(state)).await;
    }
}

/// Next message of the given kind, skipping candidates and presence
pub async fn recv_kind(
    rx: &mut mpsc::UnboundedReceiver<SignalingMessage>,
    kind: &str,
) -> SignalingMessage {
    loop {
        let msg = rx.recv().await.expect("signaling closed");
        if msg.kind() == kind {
            return msg;
        }
    }
}

pub fn sdp_of(msg: &SignalingMessage) -> SessionDescription {
    match &msg.body {
        SignalBody::Offer(p) | SignalBody::Answer(p) => p.sdp.clone(),
        other => panic!("not an SDP message: {other:?}"),
    }
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        connection_id: "remote".into(),
    }
}

pub fn remote_track(id: &str, kind: callcore::media::TrackKind) -> TransportEvent {
    TransportEvent::RemoteTrack(callcore::peer::RemoteTrack::new(id, kind, "remote-stream"))
}

/// Drive an initiator call up to `Connected`, returning the remote inbox
pub async fn connect_initiator(h: &Harness) -> mpsc::UnboundedReceiver<SignalingMessage> {
    h.controller
        .initialize(callcore::Role::Initiator, LOCAL, ROOM)
        .await
        .unwrap();
    let mut remote = h.remote_joins();

    let offer = recv_kind(&mut remote, "offer").await;
    assert_eq!(sdp_of(&offer).sdp_type, callcore::peer::SdpType::Offer);
    h.remote_sends(SignalBody::Answer(callcore::peer::SdpPayload::new(
        SessionDescription::answer("v=0 remote answer"),
        "remote-negotiation",
    )));

    let transport = h.transport();
    eventually(|| transport.count("set_remote:answer") == 1).await;
    transport.emit(remote_track("a1", callcore::media::TrackKind::Audio));
    transport.emit(remote_track("v1", callcore::media::TrackKind::Video));
    transport.emit(TransportEvent::StateChanged(
        callcore::peer::TransportState::Connected,
    ));
    h.wait_for_state(ConnectionState::Connected).await;
    remote
}
