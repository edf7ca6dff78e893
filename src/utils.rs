use crate::peer::types::ServerConfig;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Add the protocol scheme to an ICE server URL when it is missing
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:")
        || config.url.starts_with("turns:")
        || config.url.starts_with("stun:")
    {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

/// Stable digest of an SDP body, used to recognise re-delivered descriptions
pub fn sdp_digest(sdp: &str) -> String {
    hex::encode(Sha256::digest(sdp.as_bytes()))
}

/// Lock a mutex, recovering the guard if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(kind: &str, url: &str) -> ServerConfig {
        ServerConfig {
            id: "s1".into(),
            r#type: kind.into(),
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    #[test]
    fn test_random_id_is_hex() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random_id(), id);
    }

    #[test]
    fn test_ice_url_scheme() {
        assert_eq!(
            add_ice_url_scheme(&server("stun", "stun.example.org:3478")),
            "stun:stun.example.org:3478"
        );
        assert_eq!(
            add_ice_url_scheme(&server("turn", "turn.example.org:3478")),
            "turn:turn.example.org:3478"
        );
        assert_eq!(
            add_ice_url_scheme(&server("turn", "turns:turn.example.org:5349")),
            "turns:turn.example.org:5349"
        );
    }

    #[test]
    fn test_sdp_digest() {
        assert_eq!(sdp_digest("v=0"), sdp_digest("v=0"));
        assert_ne!(sdp_digest("v=0"), sdp_digest("v=1"));
        assert_eq!(sdp_digest("v=0").len(), 64);
    }
}
