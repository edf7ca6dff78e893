use crate::config::{CallConfig, DEFAULT_ICE_SERVERS};
use crate::error::{CallError, Result};
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::media::{MediaTrack, TrackKind};
use crate::peer::transport::{TrackReplacement, Transport, TransportEvents, TransportFactory};
use crate::peer::types::{
    IceCandidate, RemoteTrack, SdpType, ServerConfig, SessionDescription, TransportEvent,
    TransportState,
};
use crate::utils::{add_ice_url_scheme, lock};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Creates [`WebRtcTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct WebRtcTransportFactory;

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        config: &CallConfig,
        events: TransportEvents,
    ) -> Result<Arc<dyn Transport>> {
        let transport = WebRtcTransport::new(config, events).await?;
        Ok(Arc::new(transport))
    }
}

/// Transport backed by a webrtc-rs peer connection
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    video_sender: Mutex<Option<Arc<RTCRtpSender>>>,
}

impl WebRtcTransport {
    pub async fn new(config: &CallConfig, events: TransportEvents) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| CallError::NegotiationFailed(format!("codec registration: {e}")))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| CallError::NegotiationFailed(format!("interceptor registration: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(rtc_config(config))
                .await
                .map_err(|e| CallError::NegotiationFailed(format!("peer connection: {e}")))?,
        );

        attach_handlers(&pc, events);
        info!(
            ice_servers = config.ice_servers.len(),
            "peer connection created"
        );

        Ok(Self {
            pc,
            video_sender: Mutex::new(None),
        })
    }

    async fn attach(&self, track: &MediaTrack) -> Result<Arc<RTCRtpSender>> {
        let rtp = track.rtp() as Arc<dyn TrackLocal + Send + Sync>;
        let sender = self
            .pc
            .add_track(rtp)
            .await
            .map_err(|e| CallError::NegotiationFailed(format!("add track: {e}")))?;

        // RTCP has to be read for interceptors like NACK to work
        let rtcp_sender = Arc::clone(&sender);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtcp_sender.read(&mut buf).await {}
        });

        Ok(sender)
    }
}

fn attach_handlers(pc: &Arc<RTCPeerConnection>, events: TransportEvents) {
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            let Some(c) = cand else {
                debug!("ICE candidate gathering completed");
                let _ = tx.send(TransportEvent::GatheringComplete);
                return;
            };
            match c.to_json() {
                Ok(init) => {
                    let candidate = IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        connection_id: String::new(),
                    };
                    dump_candidate("local", &candidate);
                    let _ = tx.send(TransportEvent::LocalCandidate(candidate));
                }
                Err(e) => warn!(error = %e, "failed to serialize local candidate"),
            }
        })
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        debug!(?state, "ICE gathering state changed");
        Box::pin(async {})
    }));

    let tx = events.clone();
    let weak = Arc::downgrade(pc);
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        debug!(state = ?st, "peer connection state changed");
        let mapped = match st {
            RTCPeerConnectionState::New => Some(TransportState::New),
            RTCPeerConnectionState::Connecting => Some(TransportState::Checking),
            RTCPeerConnectionState::Connected => Some(TransportState::Connected),
            RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
            RTCPeerConnectionState::Failed => Some(TransportState::Failed),
            RTCPeerConnectionState::Closed => Some(TransportState::Closed),
            _ => None,
        };

        if matches!(
            st,
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed
        ) {
            if let Some(pc) = weak.upgrade() {
                tokio::spawn(async move {
                    dump_selected_pair(&pc, "before-fail").await;
                });
            }
        }

        if let Some(state) = mapped {
            let _ = tx.send(TransportEvent::StateChanged(state));
        }
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let remote = RemoteTrack::from_webrtc(track);
            info!(id = %remote.id(), kind = ?remote.kind(), "remote track received");
            let _ = tx.send(TransportEvent::RemoteTrack(remote));
            Box::pin(async {})
        },
    ));
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let converted = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    converted.map_err(|e| CallError::NegotiationFailed(format!("invalid SDP: {e}")))
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn add_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        let sender = self.attach(&track).await?;
        if track.kind() == TrackKind::Video {
            *lock(&self.video_sender) = Some(sender);
        }
        debug!(id = %track.id(), kind = ?track.kind(), "local track attached");
        Ok(())
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        let options = RTCOfferOptions {
            ice_restart,
            ..Default::default()
        };
        let offer = self
            .pc
            .create_offer(Some(options))
            .await
            .map_err(|e| CallError::NegotiationFailed(format!("create offer: {e}")))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| CallError::NegotiationFailed(format!("create answer: {e}")))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc
            .set_local_description(to_rtc(desc)?)
            .await
            .map_err(|e| CallError::NegotiationFailed(format!("set local description: {e}")))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(to_rtc(desc)?)
            .await
            .map_err(|e| CallError::NegotiationFailed(format!("set remote description: {e}")))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        dump_candidate("remote", &candidate);
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| CallError::NegotiationFailed(format!("add ICE candidate: {e}")))
    }

    async fn replace_video_track(&self, track: Arc<MediaTrack>) -> Result<TrackReplacement> {
        let sender = lock(&self.video_sender).clone();
        let Some(sender) = sender else {
            return Ok(TrackReplacement::Unsupported);
        };
        let rtp = track.rtp() as Arc<dyn TrackLocal + Send + Sync>;
        match sender.replace_track(Some(rtp)).await {
            Ok(()) => Ok(TrackReplacement::InPlace),
            Err(e) => {
                debug!(error = %e, "in-place track replacement rejected");
                Ok(TrackReplacement::Unsupported)
            }
        }
    }

    async fn reattach_video_track(&self, track: Arc<MediaTrack>) -> Result<()> {
        let old = lock(&self.video_sender).take();
        if let Some(old) = old {
            if let Err(e) = self.pc.remove_track(&old).await {
                warn!(error = %e, "failed to detach previous video sender");
            }
        }
        let sender = self.attach(&track).await?;
        *lock(&self.video_sender) = Some(sender);
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!(error = %e, "peer connection close failed");
        }
    }
}

/// Build the peer connection configuration
fn rtc_config(config: &CallConfig) -> RTCConfiguration {
    let servers = if config.ice_servers.is_empty() {
        DEFAULT_ICE_SERVERS.as_slice()
    } else {
        config.ice_servers.as_slice()
    };

    RTCConfiguration {
        ice_servers: get_user_ice_servers(servers),
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Convert configured servers into webrtc ICE servers
pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}
