//! Peer records tracked by the rendezvous registry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Length of the trailing liveness window, in seconds.
///
/// A peer whose `last_seen` falls inside this window (inclusive) is active.
pub const ACTIVE_WINDOW_SECS: i64 = 60;

/// The liveness window as a chrono duration.
pub fn active_window() -> Duration {
    Duration::seconds(ACTIVE_WINDOW_SECS)
}

/// A registered peer and the last time it was heard from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Self-declared, unauthenticated peer id.
    pub id: String,
    /// Address the peer registered from, as observed by the registry.
    pub ip: String,
    /// Port the peer accepts chat connections on.
    pub port: u16,
    /// Last register or heartbeat (UTC).
    pub last_seen: DateTime<Utc>,
}

impl PeerRecord {
    /// Build a record seen at `last_seen`.
    pub fn new(
        id: impl Into<String>,
        ip: impl Into<String>,
        port: u16,
        last_seen: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            ip: ip.into(),
            port,
            last_seen,
        }
    }

    /// Whether this record is inside the liveness window relative to `now`.
    ///
    /// The boundary is inclusive: a record exactly one window old is active.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.last_seen >= now - active_window()
    }

    /// Chat endpoint advertised by this peer, if `ip` parses as an address.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}
