//! Route handlers for the rendezvous API.

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use parley_kernel::ParleyKernel;
use parley_types::error::ParleyError;
use parley_types::peer::PeerRecord;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state.
pub struct AppState {
    pub kernel: Arc<ParleyKernel>,
}

/// Body of `POST /register`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub id: String,
    /// Port the peer accepts chat connections on.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub id: String,
    pub ip: String,
    pub port: u16,
}

/// Query of `POST /heartbeat`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatQuery {
    pub peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// POST /register: Upsert a peer; the ip is the caller's observed address.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let ip = remote.ip().to_canonical().to_string();
    let record = state.kernel.registry().register(&req.id, &ip, req.port);
    info!(peer = %record.id, ip = %record.ip, port = record.port, "Peer registered");

    Json(RegisterResponse {
        message: "Peer registered".to_string(),
        id: record.id,
        ip: record.ip,
        port: record.port,
    })
}

/// POST /heartbeat?peer_id=<id>: Refresh a registered peer.
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HeartbeatQuery>,
) -> axum::response::Response {
    match state.kernel.registry().heartbeat(&query.peer_id) {
        Ok(timestamp) => Json(HeartbeatResponse {
            message: "Heartbeat received".to_string(),
            timestamp,
        })
        .into_response(),
        Err(ParleyError::PeerNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"detail": "Peer not found"})),
        )
            .into_response(),
        Err(e) => {
            error!(peer = %query.peer_id, "Heartbeat failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"detail": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// GET /peers: Peers seen within the last 60 seconds.
pub async fn list_peers(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let active: Vec<PeerRecord> = state.kernel.registry().list_active();
    if active.is_empty() {
        return Json(serde_json::json!({"message": "No active peers found"})).into_response();
    }
    Json(active).into_response()
}

/// GET /health: Liveness probe with registry counts.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.kernel.status();
    Json(serde_json::json!({
        "status": "ok",
        "peers": status.peers,
        "active": status.active,
    }))
}
