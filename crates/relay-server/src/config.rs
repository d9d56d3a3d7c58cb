//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind. `0` auto-assigns.
    pub port: u16,
    /// Directory holding `index.html` and the client assets.
    pub public_dir: PathBuf,
    /// Per-connection outbound queue length before frames are dropped.
    pub max_send_queue: usize,
    /// Capacity of the channel feeding the dispatch loop.
    pub event_queue: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Drop a client after this many seconds without a pong.
    pub client_timeout_secs: u64,
    /// How often to sweep for dead clients, in seconds.
    pub cleanup_interval_secs: u64,
    /// Reject joins whose trimmed name is shorter than two characters.
    pub require_valid_names: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            public_dir: PathBuf::from("public"),
            max_send_queue: 256,
            event_queue: 1024,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
            require_valid_names: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
