//! HTTP rendezvous API for the Parley daemon.
//!
//! Peers register the port they accept chats on, keep themselves alive with
//! heartbeats, and list who else is currently reachable.

pub mod routes;
pub mod server;
