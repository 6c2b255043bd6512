//! Parley chat wire protocol.
//!
//! Turns a bare TCP socket into a named chat session and multiplexes every
//! open connection into one inbound stream.
//!
//! ## Architecture
//!
//! - **ChatNode**: listener, outbound handshake and the send/close surface
//! - **SessionTable**: which sessions exist, and the write half of each
//! - **InboundQueue**: `(session id, bytes)` chunks from every reader
//! - **ChatHandle**: accept policy for inbound handshakes
//!
//! The handshake is plain text: the dialer writes `CHAT_REQUEST:<id>` and
//! the responder answers `ACCEPT` (anything else declines). After that the
//! connection is an unframed byte stream in both directions.

pub mod error;
pub mod message;
pub mod peer;
pub mod queue;
pub mod session;

pub use error::WireError;
pub use peer::{AcceptAll, ChatHandle, ChatNode};
pub use queue::{InboundReceiver, InboundSender};
pub use session::SessionTable;
