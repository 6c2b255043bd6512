//! Session identifiers, inbound payloads and session lifecycle events.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Process-scoped sequential session identifier.
///
/// Issued ids start at 1. The value 0 is reserved for bytes that arrive on
/// an inbound connection with no associated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Sentinel tag for unassociated inbound connections.
    pub const UNASSOCIATED: SessionId = SessionId(0);

    /// Whether this is the unassociated sentinel.
    pub fn is_unassociated(self) -> bool {
        self == Self::UNASSOCIATED
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// One chunk read from a connection, tagged with its session.
///
/// Chunks follow the underlying stream: one `send` on the far side may
/// arrive as several messages, or be merged with its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Owning session, or [`SessionId::UNASSOCIATED`].
    pub session_id: SessionId,
    /// Raw bytes as read from the socket.
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(session_id: SessionId, payload: impl Into<Bytes>) -> Self {
        Self {
            session_id,
            payload: payload.into(),
        }
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Which side initiated a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionDirection {
    /// We dialed out and received `ACCEPT`.
    Outbound,
    /// A remote peer dialed in and we answered `ACCEPT`.
    Inbound,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// `close` was called locally.
    LocalClose,
    /// The remote side reached end-of-stream.
    RemoteClosed,
    /// The reader hit a socket error.
    ReadError,
    /// The node was shut down.
    Shutdown,
}

/// Snapshot of an open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    /// Identity declared in an inbound handshake, or the registry id when
    /// dialed via a peer record. Empty for dials by bare address.
    pub remote_id: String,
    pub remote_addr: SocketAddr,
    pub direction: SessionDirection,
    pub opened_at: DateTime<Utc>,
}

/// Lifecycle notifications for subscribers that want them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Opened(SessionInfo),
    Closed { id: SessionId, reason: CloseReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassociated_sentinel() {
        assert!(SessionId::UNASSOCIATED.is_unassociated());
        assert!(!SessionId(1).is_unassociated());
        assert_eq!(SessionId::UNASSOCIATED.0, 0);
    }

    #[test]
    fn test_inbound_text_is_lossy() {
        let msg = InboundMessage::new(SessionId(3), vec![b'h', b'i', 0xff]);
        assert_eq!(msg.text(), "hi\u{fffd}");
    }

    #[test]
    fn test_closed_event_serialization() {
        let ev = SessionEvent::Closed {
            id: SessionId(7),
            reason: CloseReason::RemoteClosed,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"event\":\"closed\""));
        assert!(json.contains("remote_closed"));
    }
}
