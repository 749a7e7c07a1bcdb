//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// ICE server entry (STUN or TURN)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    /// Server URLs, e.g. `stun:stun.l.google.com:19302`
    pub urls: Vec<String>,

    /// TURN username (empty for STUN)
    #[serde(default)]
    pub username: String,

    /// TURN credential (empty for STUN)
    #[serde(default)]
    pub credential: String,
}

impl IceServerConfig {
    /// Convenience constructor for a credential-less STUN server
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: String::new(),
            credential: String::new(),
        }
    }
}

/// Configuration for the session engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// ICE servers used for connectivity establishment
    pub ice_servers: Vec<IceServerConfig>,

    /// Label for the per-peer control data channel
    pub channel_label: String,

    /// Maximum automatic re-offer attempts after a failed connection
    pub max_restart_attempts: u32,

    /// Base delay before the first restart attempt; doubles per attempt
    pub restart_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServerConfig::stun("stun:stun.l.google.com:19302"),
                IceServerConfig::stun("stun:stun1.l.google.com:19302"),
            ],
            channel_label: "control".to_string(),
            max_restart_attempts: 3,
            restart_backoff: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Backoff delay for the given restart attempt (1-based)
    pub fn restart_delay(&self, attempt: u32) -> Duration {
        self.restart_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
