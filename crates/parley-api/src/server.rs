//! Router construction and the daemon serve loop.

use crate::routes::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use parley_kernel::ParleyKernel;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the rendezvous router around a booted kernel.
pub fn build_router(kernel: Arc<ParleyKernel>) -> Router {
    let state = Arc::new(AppState { kernel });

    Router::new()
        .route("/register", post(routes::register))
        .route("/heartbeat", post(routes::heartbeat))
        .route("/peers", get(routes::list_peers))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown_rx` turns `true`.
///
/// Starts the kernel's background tasks first and stops them on the way
/// out.
pub async fn run_daemon(
    kernel: Arc<ParleyKernel>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    kernel.start_background();
    let app = build_router(Arc::clone(&kernel));

    let addr = listener.local_addr()?;
    info!("Parley daemon listening on http://{addr}");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.wait_for(|v| *v).await;
        info!("Daemon received shutdown signal");
    })
    .await;

    kernel.shutdown().await;
    result
}
