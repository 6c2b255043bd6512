//! HTTP client for the rendezvous daemon.

use chrono::{DateTime, Utc};
use parley_types::peer::PeerRecord;
use serde_json::Value;
use std::time::Duration;

/// Result of a heartbeat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heartbeat {
    Ok(DateTime<Utc>),
    /// The daemon does not know this id (never registered, or reaped).
    Unknown,
}

/// Async client for `/register`, `/heartbeat` and `/peers`.
#[derive(Clone)]
pub struct RendezvousClient {
    base: String,
    http: reqwest::Client,
}

impl RendezvousClient {
    pub fn new(base: &str) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Register `id` with its chat `port`. Returns the ip the daemon observed.
    pub async fn register(&self, id: &str, port: u16) -> Result<String, String> {
        let body: Value = self
            .http
            .post(format!("{}/register", self.base))
            .json(&serde_json::json!({"id": id, "port": port}))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("register failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("register returned invalid JSON: {e}"))?;
        Ok(body["ip"].as_str().unwrap_or_default().to_string())
    }

    pub async fn heartbeat(&self, id: &str) -> Result<Heartbeat, String> {
        let resp = self
            .http
            .post(format!("{}/heartbeat", self.base))
            .query(&[("peer_id", id)])
            .send()
            .await
            .map_err(|e| format!("heartbeat failed: {e}"))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Heartbeat::Unknown);
        }
        let body: Value = resp
            .error_for_status()
            .map_err(|e| format!("heartbeat failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("heartbeat returned invalid JSON: {e}"))?;
        let ts = body["timestamp"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Ok(Heartbeat::Ok(ts))
    }

    /// Raw `/peers` response.
    pub async fn peers_json(&self) -> Result<Value, String> {
        self.http
            .get(format!("{}/peers", self.base))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("cannot reach daemon at {}: {e}", self.base))?
            .json()
            .await
            .map_err(|e| format!("peers returned invalid JSON: {e}"))
    }

    pub async fn peers(&self) -> Result<Vec<PeerRecord>, String> {
        parse_peers(self.peers_json().await?)
    }
}

/// Decode a `/peers` body: an array of records, or the "no active peers"
/// message object.
pub fn parse_peers(body: Value) -> Result<Vec<PeerRecord>, String> {
    match body {
        Value::Array(_) => {
            serde_json::from_value(body).map_err(|e| format!("unexpected peer record: {e}"))
        }
        Value::Object(ref obj) if obj.contains_key("message") => Ok(Vec::new()),
        other => Err(format!("unexpected /peers response: {other}")),
    }
}
