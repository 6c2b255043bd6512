//! Handshake codec.
//!
//! The only structured bytes on the chat wire are the opening exchange:
//!
//! ```text
//! dialer    -> CHAT_REQUEST:<self-declared-id>
//! responder -> ACCEPT            (anything else, including nothing, declines)
//! ```
//!
//! Neither message carries a delimiter or length prefix. Everything after
//! the exchange is passed through untouched.

/// Prefix of the handshake request.
pub const CHAT_REQUEST_PREFIX: &str = "CHAT_REQUEST:";

/// The one response that accepts a chat.
pub const ACCEPT: &[u8] = b"ACCEPT";

/// What a Parley responder writes when it refuses a chat.
pub const DECLINE: &[u8] = b"DECLINE";

/// Size of each socket read, for both the handshake and session readers.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Outcome of reading the responder's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Accepted,
    /// Declined, with the (lossily decoded) response for diagnostics.
    Declined(String),
}

/// Encode the handshake request for `self_id`.
pub fn encode_chat_request(self_id: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(CHAT_REQUEST_PREFIX.len() + self_id.len());
    bytes.extend_from_slice(CHAT_REQUEST_PREFIX.as_bytes());
    bytes.extend_from_slice(self_id.as_bytes());
    bytes
}

/// Parse a handshake request, returning the declared peer id.
///
/// The id is everything after the prefix; it is not validated beyond being
/// UTF-8.
pub fn parse_chat_request(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.strip_prefix(CHAT_REQUEST_PREFIX).map(str::to_string)
}

/// Classify a handshake response. Only the exact bytes `ACCEPT` accept.
pub fn handshake_outcome(response: &[u8]) -> HandshakeOutcome {
    if response == ACCEPT {
        HandshakeOutcome::Accepted
    } else {
        HandshakeOutcome::Declined(String::from_utf8_lossy(response).into_owned())
    }
}
