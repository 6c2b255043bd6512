//! Persistent storage for Parley.
//!
//! Peer records live in a single SQLite table so that the registry survives
//! a daemon restart. The registry keeps its working set in memory and writes
//! through to [`PeerStore`].

pub mod migration;
pub mod peers;

pub use peers::PeerStore;
