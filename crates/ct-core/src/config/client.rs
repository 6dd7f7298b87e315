//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Configuration for the interactive client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address to connect to
    pub server_address: String,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Log every decoded frame
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "localhost:8023".to_string(),
            connect_timeout: Duration::from_secs(10),
            debug: false,
        }
    }
}
