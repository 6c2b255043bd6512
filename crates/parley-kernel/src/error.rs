//! Kernel-specific error types.

use parley_types::error::ParleyError;
use thiserror::Error;

/// Kernel error type wrapping ParleyError with kernel-specific context.
#[derive(Error, Debug)]
pub enum KernelError {
    /// A wrapped ParleyError.
    #[error(transparent)]
    Parley(#[from] ParleyError),

    /// The kernel failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_wrap() {
        let err: KernelError = ParleyError::PeerNotFound("ghost".to_string()).into();
        assert_eq!(err.to_string(), "Peer not found: ghost");
        assert!(matches!(err, KernelError::Parley(ParleyError::PeerNotFound(_))));
    }

    #[test]
    fn test_boot_failed_display() {
        let err = KernelError::BootFailed("store locked".to_string());
        assert_eq!(err.to_string(), "Boot failed: store locked");
    }
}
