//! Parley CLI - rendezvous daemon, peer listing and an interactive chat node.

mod cli;
mod client;
mod cmd;
mod table;
mod ui;

use crate::cli::{Cli, Commands};
use clap::Parser;

/// Trace to stderr so chat output on stdout stays readable.
fn init_tracing_stderr(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { .. } => init_tracing_stderr("info"),
        _ => init_tracing_stderr("warn"),
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => ui::fatal(&format!("Failed to start tokio runtime: {e}")),
    };

    rt.block_on(async move {
        match cli.command {
            Commands::Serve { listen, db } => cmd::serve::cmd_serve(cli.config, listen, db).await,
            Commands::Peers { server, json } => cmd::peers::cmd_peers(&server, json).await,
            Commands::Node {
                id,
                port,
                server,
                inbound_mode,
            } => cmd::node::cmd_node(cli.config, id, port, &server, inbound_mode).await,
        }
    });
}
