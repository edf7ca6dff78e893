pub mod connection;
pub mod ice;
pub mod manager;
pub mod transport;
pub mod types;

pub use connection::{WebRtcTransport, WebRtcTransportFactory};
pub use ice::{analyze_candidates, probe_ice_server, CandidateStats, PendingCandidateQueue};
pub use manager::{PeerConnectionManager, PeerEvent};
pub use transport::{TrackReplacement, Transport, TransportEvents, TransportFactory};
pub use types::{
    IceCandidate, RemoteStream, RemoteTrack, SdpPayload, SdpType, ServerConfig,
    SessionDescription, TransportEvent, TransportState,
};
