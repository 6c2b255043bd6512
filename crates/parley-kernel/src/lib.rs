//! Core kernel for Parley.
//!
//! The kernel owns the peer registry and everything that keeps it running:
//! configuration, the optional persistent store, the stale-record reaper and
//! the shutdown signal shared by background tasks.

pub mod config;
pub mod error;
pub mod kernel;
pub mod reaper;
pub mod registry;
pub mod supervisor;

pub use kernel::ParleyKernel;
pub use registry::PeerRegistry;
