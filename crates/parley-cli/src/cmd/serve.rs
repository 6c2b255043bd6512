//! `parley serve` - run the rendezvous daemon.

use crate::ui;
use parley_api::server::run_daemon;
use parley_kernel::config::{load_config, resolve_db_path};
use parley_kernel::ParleyKernel;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn cmd_serve(config: Option<PathBuf>, listen: Option<SocketAddr>, db: Option<PathBuf>) {
    let mut config = load_config(config.as_deref());
    if let Some(addr) = listen {
        config.api.listen_addr = addr;
    }
    if let Some(path) = db {
        config.storage.db_path = Some(path);
    }

    let addr = config.api.listen_addr;
    let db_path = resolve_db_path(&config);
    let kernel = match ParleyKernel::boot(config) {
        Ok(k) => Arc::new(k),
        Err(e) => ui::fatal(&format!("Failed to boot kernel: {e}")),
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => ui::fatal(&format!("Failed to bind {addr}: {e}")),
    };

    ui::section("Parley rendezvous daemon");
    ui::kv("API", &format!("http://{addr}"));
    ui::kv("Database", &db_path.display().to_string());
    ui::kv("Peers", &kernel.registry().len().to_string());
    ui::hint("Press Ctrl+C to stop.");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!("Cannot listen for Ctrl+C: {e}");
                // Keep the sender alive so the server is not stopped.
                std::future::pending::<()>().await;
            }
        }
    });

    if let Err(e) = run_daemon(kernel, listener, shutdown_rx).await {
        ui::fatal(&format!("Daemon error: {e}"));
    }
    ui::success("Daemon stopped");
}
