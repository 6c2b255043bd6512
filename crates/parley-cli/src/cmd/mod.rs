//! Command implementations.

pub mod node;
pub mod peers;
pub mod serve;
