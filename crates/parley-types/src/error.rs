//! Shared error types for Parley.

use thiserror::Error;

/// Top-level error type for registry and storage operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Heartbeat (or lookup) for an id that was never registered.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// The persistent peer store failed.
    #[error("Memory error: {0}")]
    Memory(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Alias for Result with ParleyError.
pub type ParleyResult<T> = Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_not_found_message() {
        let err = ParleyError::PeerNotFound("alice".to_string());
        assert_eq!(err.to_string(), "Peer not found: alice");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: ParleyError = io.into();
        assert!(matches!(err, ParleyError::Io(_)));
    }
}
