//! Stale-record reaper.
//!
//! Listings already hide peers outside the 60-second window; the reaper is
//! what eventually deletes them. It is off by default, and its grace period
//! is always strictly longer than the window so it can never remove a peer
//! that a listing would still show.

use crate::registry::PeerRegistry;
use crate::supervisor::wait_for_shutdown;
use chrono::{DateTime, Duration, Utc};
use parley_types::config::ReaperConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Run one purge pass against `now`. Returns the number of records removed.
pub fn reap_once(registry: &PeerRegistry, config: &ReaperConfig, now: DateTime<Utc>) -> usize {
    let grace = Duration::seconds(config.effective_grace_secs() as i64);
    let removed = registry.purge_older_than(now, grace);
    if removed > 0 {
        warn!(removed, grace_secs = grace.num_seconds(), "Reaped stale peer records");
    } else {
        debug!("Reaper pass found nothing stale");
    }
    removed
}

/// Start the reaper if enabled. The task exits when `shutdown` fires.
pub fn spawn_reaper(
    registry: Arc<PeerRegistry>,
    config: ReaperConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        return None;
    }
    if config.effective_grace_secs() != config.grace_secs {
        warn!(
            configured = config.grace_secs,
            effective = config.effective_grace_secs(),
            "Reaper grace must exceed the liveness window, clamped"
        );
    }
    info!(
        interval_secs = config.interval().as_secs(),
        grace_secs = config.effective_grace_secs(),
        "Starting peer reaper"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval());
        // The first tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!("Reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    reap_once(&registry, &config, Utc::now());
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::Supervisor;

    fn reaper(grace_secs: u64) -> ReaperConfig {
        ReaperConfig {
            enabled: true,
            interval_secs: 1,
            grace_secs,
        }
    }

    #[test]
    fn test_reap_respects_grace() {
        let registry = PeerRegistry::new();
        let now = Utc::now();
        registry.register_at("old", "10.0.0.1", 1, now - Duration::seconds(3601));
        registry.register_at("young", "10.0.0.2", 2, now - Duration::seconds(3599));

        assert_eq!(reap_once(&registry, &reaper(3600), now), 1);
        assert!(registry.get("young").is_some());
    }

    #[test]
    fn test_short_grace_never_reaps_active_peers() {
        let registry = PeerRegistry::new();
        let now = Utc::now();
        // Active by the 60s window, and also inside the clamped 120s grace.
        registry.register_at("active", "10.0.0.1", 1, now - Duration::seconds(60));
        registry.register_at("stale", "10.0.0.2", 2, now - Duration::seconds(90));

        assert_eq!(reap_once(&registry, &reaper(10), now), 0);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_reaper_does_not_start() {
        let supervisor = Supervisor::new();
        let handle = spawn_reaper(
            Arc::new(PeerRegistry::new()),
            ReaperConfig::default(),
            supervisor.subscribe(),
        );
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_reaper_stops_on_shutdown() {
        let supervisor = Supervisor::new();
        let handle = spawn_reaper(
            Arc::new(PeerRegistry::new()),
            reaper(3600),
            supervisor.subscribe(),
        )
        .unwrap();

        supervisor.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
