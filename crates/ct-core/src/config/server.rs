//! Server configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::option_duration_secs;

/// Configuration for the session server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_address: String,

    /// How long a session waits for a prompt or auth reply (None = forever)
    #[serde(with = "option_duration_secs", skip_serializing_if = "Option::is_none")]
    pub reply_timeout: Option<Duration>,

    /// Maximum number of concurrent connections (None = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Base64 Ed25519 public key accepted by the demo service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_key: Option<String>,

    /// Greeting printed when a session starts
    pub banner: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8023".to_string(),
            reply_timeout: None,
            max_connections: None,
            authorized_key: None,
            banner: "Welcome to ctlterm".to_string(),
        }
    }
}
