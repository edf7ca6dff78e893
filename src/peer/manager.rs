use crate::config::CallConfig;
use crate::error::{CallError, FailureReason, Result};
use crate::media::{MediaTrack, OutgoingVideo, TrackKind};
use crate::peer::ice::{analyze_candidates, PendingCandidateQueue};
use crate::peer::transport::{TrackReplacement, Transport, TransportEvents, TransportFactory};
use crate::peer::types::{
    IceCandidate, RemoteStream, RemoteTrack, SdpPayload, SessionDescription, TransportEvent,
    TransportState,
};
use crate::session::{ConnectionState, Role};
use crate::signaling::{SignalBody, SignalingChannel, SignalingMessage};
use crate::utils::{lock, random_id};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Facts the peer connection reports to the session controller
#[derive(Debug, Clone)]
pub enum PeerEvent {
    RemoteStreamReceived(RemoteStream),
    ConnectionStateChanged(ConnectionState),
}

#[derive(Default)]
struct PeerState {
    transport: Option<Arc<dyn Transport>>,
    local_tracks: Vec<Arc<MediaTrack>>,
    replaced_video: Option<Arc<MediaTrack>>,
    pending: PendingCandidateQueue,
    remote_description_set: bool,
    applied_offer: Option<String>,
    applied_answer: Option<String>,
    last_answer: Option<SessionDescription>,
    awaiting_answer: bool,
    local_candidates: Vec<IceCandidate>,
    remote_tracks: Vec<RemoteTrack>,
    stream: Option<RemoteStream>,
    closed: bool,
}

/// Owns the single peer connection of a call and drives offer/answer and
/// candidate exchange over signaling.
///
/// Negotiation steps are serialized; candidate handling is not, so remote
/// candidates can be queued while an offer is being applied.
pub struct PeerConnectionManager {
    role: Role,
    room_id: String,
    local_id: String,
    negotiation_id: String,
    signaling: Arc<dyn SignalingChannel>,
    factory: Arc<dyn TransportFactory>,
    config: CallConfig,
    events: TransportEvents,
    state: Mutex<PeerState>,
    negotiation: tokio::sync::Mutex<()>,
}

impl PeerConnectionManager {
    pub fn new(
        role: Role,
        room_id: &str,
        local_id: &str,
        signaling: Arc<dyn SignalingChannel>,
        factory: Arc<dyn TransportFactory>,
        config: CallConfig,
        events: TransportEvents,
    ) -> Self {
        Self {
            role,
            room_id: room_id.to_owned(),
            local_id: local_id.to_owned(),
            negotiation_id: random_id(),
            signaling,
            factory,
            config,
            events,
            state: Mutex::new(PeerState::default()),
            negotiation: tokio::sync::Mutex::new(()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Identifies this side's descriptions and candidates on the wire
    pub fn negotiation_id(&self) -> &str {
        &self.negotiation_id
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn has_transport(&self) -> bool {
        lock(&self.state).transport.is_some()
    }

    pub fn pending_candidates(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Latest snapshot of the remote media
    pub fn remote_stream(&self) -> Option<RemoteStream> {
        lock(&self.state).stream.clone()
    }

    /// Record the tracks attached when the transport is created.
    ///
    /// A video track swapped in through [`Self::replace_outgoing_video_track`]
    /// wins over the one in `local_tracks`.
    pub fn set_local_tracks(&self, mut local_tracks: Vec<Arc<MediaTrack>>) {
        let mut state = lock(&self.state);
        if let Some(video) = &state.replaced_video {
            local_tracks.retain(|t| t.kind() != TrackKind::Video);
            local_tracks.push(Arc::clone(video));
        }
        state.local_tracks = local_tracks;
    }

    /// Record the tracks to send. The transport is created on the first offer.
    pub fn create_as_responder(&self, local_tracks: Vec<Arc<MediaTrack>>) {
        debug!(tracks = local_tracks.len(), "prepared as responder");
        self.set_local_tracks(local_tracks);
    }

    pub async fn create_as_initiator(&self, local_tracks: Vec<Arc<MediaTrack>>) -> Result<()> {
        let _negotiating = self.negotiation.lock().await;
        self.set_local_tracks(local_tracks);
        let transport = self.ensure_transport().await?;
        self.send_offer(&transport, false).await
    }

    async fn ensure_transport(&self) -> Result<Arc<dyn Transport>> {
        {
            let state = lock(&self.state);
            if state.closed {
                return Err(CallError::SessionClosed);
            }
            if let Some(transport) = &state.transport {
                return Ok(Arc::clone(transport));
            }
        }

        let transport = self
            .factory
            .create(&self.config, self.events.clone())
            .await?;

        let tracks = {
            let mut state = lock(&self.state);
            if state.closed {
                None
            } else {
                state.transport = Some(Arc::clone(&transport));
                Some(state.local_tracks.clone())
            }
        };
        let Some(tracks) = tracks else {
            transport.close().await;
            return Err(CallError::SessionClosed);
        };

        for track in tracks {
            transport.add_track(track).await?;
        }
        info!(role = ?self.role, negotiation_id = %self.negotiation_id, "transport ready");
        Ok(transport)
    }

    async fn send_offer(&self, transport: &Arc<dyn Transport>, ice_restart: bool) -> Result<()> {
        let offer = transport.create_offer(ice_restart).await?;
        transport.set_local_description(offer.clone()).await?;
        {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(CallError::SessionClosed);
            }
            state.awaiting_answer = true;
        }
        info!(ice_restart, "sending offer");
        self.signal(SignalBody::Offer(SdpPayload::new(offer, &self.negotiation_id)))
            .await
    }

    async fn signal(&self, body: SignalBody) -> Result<()> {
        self.signaling
            .send(SignalingMessage::new(&self.room_id, &self.local_id, body))
            .await
    }

    pub async fn on_remote_offer(&self, payload: SdpPayload) -> Result<()> {
        let _negotiating = self.negotiation.lock().await;
        let digest = payload.sdp.digest();
        let resend = {
            let state = lock(&self.state);
            if state.closed {
                return Ok(());
            }
            if self.role == Role::Initiator && state.awaiting_answer {
                warn!(from = %payload.id, "offer collision, keeping our own offer");
                return Ok(());
            }
            if state.applied_offer.as_deref() == Some(digest.as_str()) {
                Some(state.last_answer.clone())
            } else {
                None
            }
        };

        if let Some(last_answer) = resend {
            debug!(from = %payload.id, "duplicate offer");
            if let Some(answer) = last_answer {
                self.signal(SignalBody::Answer(SdpPayload::new(answer, &self.negotiation_id)))
                    .await?;
            }
            return Ok(());
        }

        let transport = self.ensure_transport().await?;
        transport.set_remote_description(payload.sdp).await?;
        lock(&self.state).applied_offer = Some(digest);

        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;
        {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(CallError::SessionClosed);
            }
            state.last_answer = Some(answer.clone());
        }
        info!(from = %payload.id, "sending answer");
        self.signal(SignalBody::Answer(SdpPayload::new(answer, &self.negotiation_id)))
            .await?;

        self.flush_pending(&transport).await;
        Ok(())
    }

    pub async fn on_remote_answer(&self, payload: SdpPayload) -> Result<()> {
        let _negotiating = self.negotiation.lock().await;
        let digest = payload.sdp.digest();
        let transport = {
            let state = lock(&self.state);
            if state.closed {
                return Ok(());
            }
            if state.applied_answer.as_deref() == Some(digest.as_str()) {
                debug!(from = %payload.id, "duplicate answer ignored");
                return Ok(());
            }
            match (&state.transport, state.awaiting_answer) {
                (Some(transport), true) => Arc::clone(transport),
                _ => {
                    warn!(from = %payload.id, "unsolicited answer ignored");
                    return Ok(());
                }
            }
        };

        transport.set_remote_description(payload.sdp).await?;
        {
            let mut state = lock(&self.state);
            state.awaiting_answer = false;
            state.applied_answer = Some(digest);
        }
        info!(from = %payload.id, "answer applied");
        self.flush_pending(&transport).await;
        Ok(())
    }

    /// Apply a remote candidate, or queue it until the remote description is set.
    /// Application errors are logged only.
    pub async fn on_remote_ice_candidate(&self, candidate: IceCandidate) {
        let transport = {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            let ready = if state.remote_description_set {
                state.transport.clone()
            } else {
                None
            };
            match ready {
                Some(transport) => transport,
                None => {
                    state.pending.push(candidate);
                    debug!(
                        queued = state.pending.len(),
                        "remote description not set, candidate queued"
                    );
                    return;
                }
            }
        };

        if let Err(e) = transport.add_ice_candidate(candidate).await {
            warn!(error = %e, "failed to add remote candidate");
        }
    }

    /// Apply queued candidates in arrival order, then let new ones through.
    async fn flush_pending(&self, transport: &Arc<dyn Transport>) {
        let mut applied = 0;
        loop {
            let batch = {
                let mut state = lock(&self.state);
                let batch = state.pending.drain();
                if batch.is_empty() {
                    state.remote_description_set = true;
                    break;
                }
                batch
            };
            for candidate in batch {
                if let Err(e) = transport.add_ice_candidate(candidate).await {
                    warn!(error = %e, "failed to apply queued candidate");
                }
                applied += 1;
            }
        }
        if applied > 0 {
            debug!(applied, "queued candidates applied");
        }
    }

    pub async fn on_local_ice_candidate(&self, mut candidate: IceCandidate) -> Result<()> {
        candidate.connection_id = self.negotiation_id.clone();
        {
            let mut state = lock(&self.state);
            if state.closed {
                return Ok(());
            }
            state.local_candidates.push(candidate.clone());
        }
        self.signal(SignalBody::IceCandidate(candidate)).await
    }

    /// Send an ICE-restart offer. The responder waits for the initiator's.
    pub async fn restart_ice(&self) -> Result<bool> {
        if self.role != Role::Initiator {
            debug!("waiting for the initiator to restart ICE");
            return Ok(false);
        }
        let _negotiating = self.negotiation.lock().await;
        let transport = {
            let state = lock(&self.state);
            match (&state.transport, state.closed) {
                (Some(transport), false) => Arc::clone(transport),
                _ => return Ok(false),
            }
        };
        self.send_offer(&transport, true).await?;
        Ok(true)
    }

    /// Swap the outgoing video in place, or re-attach and renegotiate when the
    /// transport cannot.
    pub async fn replace_outgoing_video_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        let transport = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(CallError::SessionClosed);
            }
            state.local_tracks.retain(|t| t.kind() != TrackKind::Video);
            state.local_tracks.push(Arc::clone(&track));
            state.replaced_video = Some(Arc::clone(&track));
            state.transport.clone()
        };
        let Some(transport) = transport else {
            return Ok(());
        };

        match transport.replace_video_track(Arc::clone(&track)).await? {
            TrackReplacement::InPlace => {
                debug!(id = %track.id(), "video track replaced in place");
                Ok(())
            }
            TrackReplacement::Unsupported => {
                info!(id = %track.id(), "track replacement unsupported, renegotiating");
                let _negotiating = self.negotiation.lock().await;
                transport.reattach_video_track(track).await?;
                self.send_offer(&transport, false).await
            }
        }
    }

    /// Turn a raw transport event into a session fact
    pub async fn handle_transport_event(&self, event: TransportEvent) -> Option<PeerEvent> {
        if self.is_closed() {
            return None;
        }
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if let Err(e) = self.on_local_ice_candidate(candidate).await {
                    warn!(error = %e, "failed to send local candidate");
                }
                None
            }
            TransportEvent::GatheringComplete => {
                let candidates = lock(&self.state).local_candidates.clone();
                analyze_candidates(&candidates);
                None
            }
            TransportEvent::RemoteTrack(track) => {
                let mut state = lock(&self.state);
                if state.remote_tracks.iter().any(|t| t.id() == track.id()) {
                    return None;
                }
                let stream_id = track.stream_id().to_owned();
                state.remote_tracks.push(track);
                let stream = RemoteStream::new(stream_id, state.remote_tracks.clone());
                state.stream = Some(stream.clone());
                Some(PeerEvent::RemoteStreamReceived(stream))
            }
            TransportEvent::StateChanged(transport_state) => {
                let mapped = match transport_state {
                    TransportState::New => return None,
                    TransportState::Checking => ConnectionState::Negotiating,
                    TransportState::Connected => ConnectionState::Connected,
                    TransportState::Disconnected => ConnectionState::Reconnecting,
                    TransportState::Failed => {
                        ConnectionState::Failed(FailureReason::TransportFailed)
                    }
                    TransportState::Closed => ConnectionState::Closed,
                };
                Some(PeerEvent::ConnectionStateChanged(mapped))
            }
        }
    }

    /// Tear down the transport. Idempotent.
    pub async fn close(&self) {
        let transport = {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
            state.local_tracks.clear();
            state.replaced_video = None;
            state.transport.take()
        };
        if let Some(transport) = transport {
            transport.close().await;
        }
        info!(negotiation_id = %self.negotiation_id, "peer connection closed");
    }
}

#[async_trait]
impl OutgoingVideo for PeerConnectionManager {
    async fn replace_outgoing_video_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        PeerConnectionManager::replace_outgoing_video_track(self, track).await
    }
}
