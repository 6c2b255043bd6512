//! Peer registry - who is reachable, and since when.
//!
//! Records live in a sharded concurrent map so operations on different ids
//! never contend, while operations on one id are serialized by its entry
//! lock. When a [`PeerStore`] is attached every mutation is written through
//! while that entry lock is still held, so the stored row for an id always
//! matches the last in-memory update. Storage failures are logged and never
//! fail the in-memory update.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parley_memory::PeerStore;
use parley_types::error::{ParleyError, ParleyResult};
use parley_types::peer::PeerRecord;
use tracing::{debug, info, warn};

/// Concurrency-safe table of peer records keyed by self-declared id.
pub struct PeerRegistry {
    peers: DashMap<String, PeerRecord>,
    store: Option<PeerStore>,
}

impl PeerRegistry {
    /// Create an empty, memory-only registry.
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            store: None,
        }
    }

    /// Create a registry backed by `store`, loading every persisted record.
    pub fn with_store(store: PeerStore) -> ParleyResult<Self> {
        let peers = DashMap::new();
        for record in store.load_all()? {
            peers.insert(record.id.clone(), record);
        }
        info!(count = peers.len(), "Loaded peer records from store");
        Ok(Self {
            peers,
            store: Some(store),
        })
    }

    /// Register (or re-register) a peer seen now.
    pub fn register(&self, id: &str, ip: &str, port: u16) -> PeerRecord {
        self.register_at(id, ip, port, Utc::now())
    }

    /// Register a peer seen at `now`.
    ///
    /// Re-registering an id updates its address in place. `last_seen` never
    /// moves backwards.
    pub fn register_at(&self, id: &str, ip: &str, port: u16, now: DateTime<Utc>) -> PeerRecord {
        let record = {
            let mut entry = self
                .peers
                .entry(id.to_string())
                .or_insert_with(|| PeerRecord::new(id, ip, port, now));
            entry.ip = ip.to_string();
            entry.port = port;
            if now > entry.last_seen {
                entry.last_seen = now;
            }

            if let Some(store) = &self.store {
                if let Err(e) = store.upsert(&entry) {
                    warn!(peer = %id, error = %e, "Failed to persist peer record");
                }
            }
            entry.clone()
        };

        debug!(peer = %record.id, ip = %record.ip, port = record.port, "Peer registered");
        record
    }

    /// Mark a registered peer as seen now. Returns the updated `last_seen`.
    pub fn heartbeat(&self, id: &str) -> ParleyResult<DateTime<Utc>> {
        self.heartbeat_at(id, Utc::now())
    }

    /// Mark a registered peer as seen at `now`.
    ///
    /// Fails with `PeerNotFound` for an unknown id and creates nothing.
    pub fn heartbeat_at(&self, id: &str, now: DateTime<Utc>) -> ParleyResult<DateTime<Utc>> {
        let last_seen = {
            let mut entry = self
                .peers
                .get_mut(id)
                .ok_or_else(|| ParleyError::PeerNotFound(id.to_string()))?;
            if now > entry.last_seen {
                entry.last_seen = now;
            }

            if let Some(store) = &self.store {
                match store.touch(id, entry.last_seen) {
                    Ok(true) => {}
                    Ok(false) => warn!(peer = %id, "Heartbeat for peer missing from store"),
                    Err(e) => warn!(peer = %id, error = %e, "Failed to persist heartbeat"),
                }
            }
            entry.last_seen
        };
        Ok(last_seen)
    }

    /// Peers seen within the last 60 seconds, sorted by id.
    pub fn list_active(&self) -> Vec<PeerRecord> {
        self.list_active_at(Utc::now())
    }

    /// Peers active relative to a single `now` snapshot, sorted by id.
    pub fn list_active_at(&self, now: DateTime<Utc>) -> Vec<PeerRecord> {
        let mut active: Vec<PeerRecord> = self
            .peers
            .iter()
            .filter(|r| r.is_active_at(now))
            .map(|r| r.value().clone())
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    /// Look up a single record, active or not.
    pub fn get(&self, id: &str) -> Option<PeerRecord> {
        self.peers.get(id).map(|r| r.value().clone())
    }

    /// Number of records held, including inactive ones.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Delete records whose `last_seen` is older than `now - grace`.
    ///
    /// A record refreshed concurrently is either removed from both memory and
    /// the store or kept in both: its stored row is refreshed before the
    /// entry lock that `retain` waits on is released.
    ///
    /// Returns how many in-memory records were removed.
    pub fn purge_older_than(&self, now: DateTime<Utc>, grace: Duration) -> usize {
        let cutoff = now - grace;
        let before = self.peers.len();
        self.peers.retain(|_, r| r.last_seen >= cutoff);
        let removed = before.saturating_sub(self.peers.len());

        if let Some(store) = &self.store {
            if let Err(e) = store.purge_older_than(cutoff) {
                warn!(error = %e, "Failed to purge stale peers from store");
            }
        }
        removed
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_register_then_list() {
        let registry = PeerRegistry::new();
        registry.register("alice", "10.0.0.1", 5001);

        let active = registry.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "alice");
        assert_eq!(active[0].ip, "10.0.0.1");
        assert_eq!(active[0].port, 5001);
    }

    #[test]
    fn test_register_is_idempotent_upsert() {
        let registry = PeerRegistry::new();
        registry.register_at("alice", "10.0.0.1", 5001, t0());
        let updated =
            registry.register_at("alice", "10.0.0.2", 6001, t0() + Duration::seconds(5));

        assert_eq!(registry.len(), 1);
        assert_eq!(updated.ip, "10.0.0.2");
        assert_eq!(updated.port, 6001);
        assert_eq!(updated.last_seen, t0() + Duration::seconds(5));
    }

    #[test]
    fn test_heartbeat_unknown_peer() {
        let registry = PeerRegistry::new();
        let err = registry.heartbeat("ghost").unwrap_err();
        assert!(matches!(err, ParleyError::PeerNotFound(ref id) if id == "ghost"));
        assert!(registry.get("ghost").is_none());
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn test_heartbeat_advances_last_seen() {
        let registry = PeerRegistry::new();
        registry.register_at("alice", "10.0.0.1", 5001, t0());
        let seen = registry
            .heartbeat_at("alice", t0() + Duration::seconds(30))
            .unwrap();
        assert_eq!(seen, t0() + Duration::seconds(30));
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let registry = PeerRegistry::new();
        registry.register_at("alice", "10.0.0.1", 5001, t0() + Duration::seconds(10));

        let seen = registry.heartbeat_at("alice", t0()).unwrap();
        assert_eq!(seen, t0() + Duration::seconds(10));

        let record = registry.register_at("alice", "10.0.0.1", 5001, t0());
        assert_eq!(record.last_seen, t0() + Duration::seconds(10));
    }

    #[test]
    fn test_active_window_boundary() {
        let registry = PeerRegistry::new();
        let now = t0();
        registry.register_at("exact", "10.0.0.1", 1, now - Duration::seconds(60));
        registry.register_at("inside", "10.0.0.2", 2, now - Duration::milliseconds(59_900));
        registry.register_at("outside", "10.0.0.3", 3, now - Duration::milliseconds(60_100));

        let ids: Vec<String> = registry
            .list_active_at(now)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["exact", "inside"]);
        // Stale records are hidden, not deleted.
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_list_sorted_by_id() {
        let registry = PeerRegistry::new();
        for id in ["carol", "alice", "bob"] {
            registry.register_at(id, "10.0.0.1", 5001, t0());
        }
        let ids: Vec<String> = registry
            .list_active_at(t0())
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_concurrent_heartbeats_distinct_ids() {
        let registry = Arc::new(PeerRegistry::new());
        let ids: Vec<String> = (0..8).map(|i| format!("peer-{i}")).collect();
        for id in &ids {
            registry.register_at(id, "10.0.0.1", 5001, t0());
        }

        let barrier = Arc::new(Barrier::new(ids.len()));
        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.heartbeat_at(&id, t0() + Duration::seconds(1))
                })
            })
            .collect();

        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }
        for id in &ids {
            assert_eq!(
                registry.get(id).unwrap().last_seen,
                t0() + Duration::seconds(1)
            );
        }
    }

    #[test]
    fn test_concurrent_heartbeats_same_id_keep_latest() {
        let registry = Arc::new(PeerRegistry::new());
        registry.register_at("alice", "10.0.0.1", 5001, t0());

        let stamps: Vec<DateTime<Utc>> =
            (1..=16).map(|s| t0() + Duration::seconds(s)).collect();
        let latest = *stamps.iter().max().unwrap();

        let barrier = Arc::new(Barrier::new(stamps.len()));
        let handles: Vec<_> = stamps
            .into_iter()
            .rev()
            .map(|at| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.heartbeat_at("alice", at).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.get("alice").unwrap().last_seen, latest);
    }

    #[test]
    fn test_purge_older_than() {
        let registry = PeerRegistry::new();
        registry.register_at("old", "10.0.0.1", 1, t0() - Duration::hours(2));
        registry.register_at("recent", "10.0.0.2", 2, t0() - Duration::minutes(5));

        let removed = registry.purge_older_than(t0(), Duration::hours(1));
        assert_eq!(removed, 1);
        assert!(registry.get("old").is_none());
        assert!(registry.get("recent").is_some());
    }

    #[test]
    fn test_records_survive_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.db");

        {
            let registry = PeerRegistry::with_store(PeerStore::open(&path).unwrap()).unwrap();
            registry.register_at("alice", "10.0.0.1", 5001, t0());
            registry.register_at("bob", "10.0.0.2", 5002, t0());
            registry
                .heartbeat_at("bob", t0() + Duration::seconds(20))
                .unwrap();
        }

        let registry = PeerRegistry::with_store(PeerStore::open(&path).unwrap()).unwrap();
        assert_eq!(registry.len(), 2);
        let bob = registry.get("bob").unwrap();
        assert_eq!(bob.port, 5002);
        assert_eq!(bob.last_seen, t0() + Duration::seconds(20));
        // Heartbeats work against loaded records without re-registering.
        assert!(registry.heartbeat_at("alice", t0() + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn test_purge_reaches_store() {
        let store = PeerStore::open_in_memory().unwrap();
        let registry = PeerRegistry::with_store(store.clone()).unwrap();
        registry.register_at("old", "10.0.0.1", 1, t0() - Duration::hours(2));
        registry.register_at("recent", "10.0.0.2", 2, t0());

        registry.purge_older_than(t0(), Duration::hours(1));
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.get("old").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_registers_leave_store_matching_memory() {
        let store = PeerStore::open_in_memory().unwrap();
        let registry = Arc::new(PeerRegistry::with_store(store.clone()).unwrap());

        for round in 0..20 {
            let barrier = Arc::new(Barrier::new(8));
            let handles: Vec<_> = (0..8u16)
                .map(|i| {
                    let registry = Arc::clone(&registry);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        let ip = format!("10.0.{round}.{i}");
                        registry.register_at("alice", &ip, 5000 + i, t0());
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            let in_memory = registry.get("alice").unwrap();
            let stored = store.get("alice").unwrap().unwrap();
            assert_eq!(stored.ip, in_memory.ip, "round {round}");
            assert_eq!(stored.port, in_memory.port, "round {round}");
        }
    }

    #[test]
    fn test_heartbeat_racing_purge_stays_consistent_with_store() {
        let store = PeerStore::open_in_memory().unwrap();
        let registry = Arc::new(PeerRegistry::with_store(store.clone()).unwrap());

        for round in 0..50 {
            registry.register_at("alice", "10.0.0.1", 5001, t0() - Duration::hours(2));

            let barrier = Arc::new(Barrier::new(2));
            let heartbeat = {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let _ = registry.heartbeat_at("alice", t0());
                })
            };
            let purge = {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.purge_older_than(t0(), Duration::hours(1));
                })
            };
            heartbeat.join().unwrap();
            purge.join().unwrap();

            assert_eq!(
                registry.get("alice").is_some(),
                store.get("alice").unwrap().is_some(),
                "round {round}"
            );
            if let Some(record) = registry.get("alice") {
                // Kept: next round starts from a stale record again.
                assert_eq!(record.last_seen, t0());
                registry.purge_older_than(t0() + Duration::hours(2), Duration::hours(1));
            }
        }
    }
}
