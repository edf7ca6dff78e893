use crate::peer::types::{IceCandidate, ServerConfig};
use crate::utils::add_ice_url_scheme;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;

/// Remote candidates that arrived before the remote description.
///
/// Drained in arrival order once the description is applied.
#[derive(Debug, Default)]
pub struct PendingCandidateQueue {
    items: VecDeque<IceCandidate>,
}

impl PendingCandidateQueue {
    pub fn push(&mut self, candidate: IceCandidate) {
        self.items.push_back(candidate);
    }

    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Candidate counts by type
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateStats {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

pub fn analyze_candidates(candidates: &[IceCandidate]) -> CandidateStats {
    let mut stats = CandidateStats::default();
    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            stats.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            stats.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            stats.relay += 1;
        }
    }

    info!(
        host = stats.host,
        srflx = stats.srflx,
        relay = stats.relay,
        "candidate analysis"
    );
    if stats.relay == 0 {
        warn!("no TURN relay candidates gathered, connections across NAT may fail");
    }
    stats
}

/// Check that an ICE server answers by gathering through it alone.
///
/// A STUN server passes when a `srflx` candidate shows up, a TURN server when a
/// `relay` candidate does.
pub async fn probe_ice_server(config: &ServerConfig, limit: Duration) -> bool {
    let ice_server = RTCIceServer {
        urls: vec![add_ice_url_scheme(config)],
        username: config.username.clone().unwrap_or_default(),
        credential: config.credential.clone().unwrap_or_default(),
    };
    debug!(urls = ?ice_server.urls, kind = %config.r#type, "probing ICE server");

    let rtc_config = RTCConfiguration {
        ice_servers: vec![ice_server],
        ..Default::default()
    };
    let pc = match APIBuilder::new().build().new_peer_connection(rtc_config).await {
        Ok(pc) => Arc::new(pc),
        Err(e) => {
            warn!(error = %e, "failed to create probe peer connection");
            return false;
        }
    };

    let result = gather_matching(&pc, &config.r#type, limit).await;
    if let Err(e) = pc.close().await {
        debug!(error = %e, "probe peer connection close failed");
    }
    info!(server = %config.id, reachable = result, "ICE server probe finished");
    result
}

async fn gather_matching(pc: &Arc<RTCPeerConnection>, server_type: &str, limit: Duration) -> bool {
    let wanted = if server_type == "turn" {
        "typ relay"
    } else {
        "typ srflx"
    };
    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        if let Some(c) = cand {
            if let Ok(init) = c.to_json() {
                if init.candidate.contains(wanted) {
                    let _ = found_tx.send(());
                }
            }
        }
        Box::pin(async {})
    }));
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        if state == RTCIceGathererState::Complete {
            let _ = done_tx.send(());
        }
        Box::pin(async {})
    }));

    // A data channel is the cheapest way to get an m-line to gather for
    if let Err(e) = pc.create_data_channel("probe", None).await {
        warn!(error = %e, "failed to create probe data channel");
        return false;
    }
    let offer = match pc.create_offer(None).await {
        Ok(offer) => offer,
        Err(e) => {
            warn!(error = %e, "failed to create probe offer");
            return false;
        }
    };
    if let Err(e) = pc.set_local_description(offer).await {
        warn!(error = %e, "failed to start probe gathering");
        return false;
    }

    let wait = async {
        tokio::select! {
            found = found_rx.recv() => found.is_some(),
            _ = done_rx.recv() => found_rx.try_recv().is_ok(),
        }
    };
    timeout(limit, wait).await.unwrap_or(false)
}
