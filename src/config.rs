//! Call configuration
//!
//! Defaults are suitable for development; every field can be overridden from the
//! environment (`CALLCORE_*`) or deserialized from JSON.

use crate::error::{CallError, Result};
use crate::peer::types::ServerConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Time a dropped transport gets to recover before the call fails
pub const DEFAULT_RECONNECT_GRACE: Duration = Duration::from_secs(5);

pub const DEFAULT_ICE_CANDIDATE_POOL_SIZE: u8 = 10;

/// Public STUN servers used when nothing else is configured
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<ServerConfig>> = Lazy::new(|| {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub ice_servers: Vec<ServerConfig>,
    /// Reconnecting grace period in milliseconds
    pub reconnect_grace_ms: u64,
    pub ice_candidate_pool_size: u8,
    /// Base URL of the WebSocket signaling relay
    pub signaling_url: Option<String>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            reconnect_grace_ms: DEFAULT_RECONNECT_GRACE.as_millis() as u64,
            ice_candidate_pool_size: DEFAULT_ICE_CANDIDATE_POOL_SIZE,
            signaling_url: None,
        }
    }
}

impl CallConfig {
    /// Load configuration from environment variables.
    ///
    /// Loads a `.env` file first if one is present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("CALLCORE_ICE_SERVERS") {
            config.ice_servers = serde_json::from_str(&raw).map_err(|e| {
                CallError::InvalidConfig(format!("CALLCORE_ICE_SERVERS is not valid JSON: {e}"))
            })?;
            info!(count = config.ice_servers.len(), "ICE servers loaded from environment");
        }

        if let Some(ms) = env_parse::<u64>("CALLCORE_RECONNECT_GRACE_MS")? {
            config.reconnect_grace_ms = ms;
        }
        if let Some(size) = env_parse::<u8>("CALLCORE_ICE_POOL_SIZE")? {
            config.ice_candidate_pool_size = size;
        }
        config.signaling_url = std::env::var("CALLCORE_SIGNALING_URL")
            .ok()
            .filter(|s| !s.is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn with_ice_servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn with_reconnect_grace(mut self, grace: Duration) -> Self {
        self.reconnect_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_signaling_url(mut self, url: impl Into<String>) -> Self {
        self.signaling_url = Some(url.into());
        self
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(CallError::InvalidConfig(format!(
                    "ICE server '{}' has an empty URL",
                    server.id
                )));
            }
            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(CallError::InvalidConfig(format!(
                    "TURN server '{}' requires username and credential",
                    server.id
                )));
            }
        }
        if self.ice_servers.is_empty() {
            warn!("No ICE servers configured, only host candidates will be gathered");
        }
        if self.reconnect_grace_ms == 0 {
            return Err(CallError::InvalidConfig(
                "reconnect grace period must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map(Some)
            .map_err(|_| CallError::InvalidConfig(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(None),
    }
}
