use crate::peer::types::IceCandidate;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use webrtc::peer_connection::RTCPeerConnection;

/// Install a fmt subscriber for applications embedding the call core.
///
/// The filter is read from `CALLCORE_LOG`, then `RUST_LOG`, falling back to
/// `default_level`. Does nothing if a global subscriber is already set.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("CALLCORE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Trace an ICE candidate as it is trickled
pub fn dump_candidate(label: &str, cand: &IceCandidate) {
    debug!(
        direction = label,
        candidate = %cand.candidate,
        sdp_mid = ?cand.sdp_mid,
        sdp_mline_index = ?cand.sdp_mline_index,
        "trickle candidate"
    );
}

/// Snapshot of getStats -> nominated candidate pair
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                debug!(
                    moment,
                    local = %pair.local_candidate_id,
                    remote = %pair.remote_candidate_id,
                    bytes_sent = pair.bytes_sent,
                    bytes_received = pair.bytes_received,
                    state = ?pair.state,
                    "selected candidate pair"
                );
            }
        }
    }
}
