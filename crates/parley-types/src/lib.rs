//! Core types for Parley.
//!
//! This crate defines the data structures shared by the peer registry, the
//! chat wire layer, the storage backend and the HTTP surface. It contains no
//! business logic.

pub mod config;
pub mod error;
pub mod peer;
pub mod session;
