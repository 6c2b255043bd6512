//! Clap CLI definitions for Parley.

use clap::{Parser, Subcommand};
use parley_types::config::InboundMode;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  parley serve                          Run the rendezvous daemon on :8000
  parley peers                          List peers active in the last minute
  parley node --id alice --port 5001    Join as 'alice' and chat interactively";

/// Default rendezvous daemon URL.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

/// Parley: peer rendezvous and direct TCP chat.
#[derive(Parser)]
#[command(name = "parley", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the rendezvous daemon (registry + HTTP API) until Ctrl+C.
    Serve {
        /// Address to listen on (overrides `[api] listen_addr`).
        #[arg(long)]
        listen: Option<SocketAddr>,
        /// SQLite database path (overrides `[storage] db_path`).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List peers the daemon has heard from in the last 60 seconds.
    Peers {
        /// Rendezvous daemon URL.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
        /// Print raw JSON.
        #[arg(long)]
        json: bool,
    },
    /// Register with the daemon and run an interactive chat node.
    Node {
        /// Peer id to register under (overrides `[chat] node_id`).
        #[arg(long)]
        id: Option<String>,
        /// Chat listener port (overrides the port of `[chat] listen_addr`).
        #[arg(long)]
        port: Option<u16>,
        /// Rendezvous daemon URL.
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
        /// How to treat inbound connections: raw or handshake.
        #[arg(long)]
        inbound_mode: Option<InboundMode>,
    },
}
