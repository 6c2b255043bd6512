//! Configuration types, deserialized from `~/.parley/config.toml`.
//!
//! Every field has a default so a partial (or missing) file is valid.

use crate::peer::ACTIVE_WINDOW_SECS;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub registry: RegistryConfig,
    pub chat: ChatConfig,
}

/// HTTP registry surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address the rendezvous daemon listens on.
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

/// Peer record persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path. `None` resolves to `~/.parley/peers.db`.
    pub db_path: Option<PathBuf>,
}

/// Registry behaviour beyond the fixed liveness window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub reaper: ReaperConfig,
}

/// Background purge of long-stale peer records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub enabled: bool,
    /// Seconds between purge passes.
    pub interval_secs: u64,
    /// Records older than this are deleted. Must exceed the liveness window.
    pub grace_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            grace_secs: 3600,
        }
    }
}

impl ReaperConfig {
    /// Grace period actually applied.
    ///
    /// Anything not strictly larger than the liveness window is replaced by
    /// twice the window.
    pub fn effective_grace_secs(&self) -> u64 {
        let window = ACTIVE_WINDOW_SECS as u64;
        if self.grace_secs > window {
            self.grace_secs
        } else {
            window * 2
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// How the listener treats connections it accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundMode {
    /// Forward every byte under the unassociated sentinel, no handshake.
    #[default]
    Raw,
    /// Require `CHAT_REQUEST:<id>` and answer `ACCEPT` / `DECLINE`.
    Handshake,
}

impl std::str::FromStr for InboundMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "handshake" => Ok(Self::Handshake),
            other => Err(format!("unknown inbound mode '{other}' (expected raw|handshake)")),
        }
    }
}

/// Chat node settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Address the chat listener binds.
    pub listen_addr: SocketAddr,
    /// Identity sent in `CHAT_REQUEST:<node_id>`.
    pub node_id: String,
    pub inbound_mode: InboundMode,
    /// Deadline for the handshake response (milliseconds).
    pub handshake_timeout_ms: u64,
    /// Deadline for establishing the TCP connection (milliseconds).
    pub connect_timeout_ms: u64,
    /// Bound of the shared inbound queue.
    pub inbound_queue_capacity: usize,
    /// Drop a session from the table once its reader sees end-of-stream.
    pub close_on_eof: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5001)),
            node_id: uuid::Uuid::new_v4().to_string(),
            inbound_mode: InboundMode::Raw,
            handshake_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            inbound_queue_capacity: 1024,
            close_on_eof: false,
        }
    }
}

impl ChatConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
