//! Errors from the chat wire layer.

use parley_types::session::SessionId;
use std::time::Duration;
use thiserror::Error;

/// Errors from the chat wire layer.
///
/// Each failure mode is its own variant so callers can tell "declined"
/// from "unreachable" from "unknown session".
#[derive(Debug, Error)]
pub enum WireError {
    /// The responder answered something other than `ACCEPT`.
    #[error("Chat declined by peer (response: {response:?})")]
    ChatDeclined { response: String },
    /// No open session with this id.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),
    /// The handshake response did not arrive in time.
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    /// Connect, read or write failure on the socket.
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),
    /// The node has been shut down.
    #[error("Chat node is shutting down")]
    ShuttingDown,
}

impl WireError {
    pub(crate) fn connect_timeout(after: Duration) -> Self {
        WireError::Connection(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect timed out after {after:?}"),
        ))
    }
}
