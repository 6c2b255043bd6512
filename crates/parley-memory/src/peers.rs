//! SQLite store for peer records.

use crate::migration::run_migrations;
use chrono::{DateTime, Utc};
use parley_types::error::{ParleyError, ParleyResult};
use parley_types::peer::PeerRecord;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Peer record store backed by SQLite.
///
/// `last_seen` only ever moves forward in storage: every write keeps the
/// larger of the stored and the incoming timestamp.
#[derive(Clone)]
pub struct PeerStore {
    conn: Arc<Mutex<Connection>>,
}

impl PeerStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> ParleyResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| ParleyError::Memory(e.to_string()))?;
        debug!(path = %path.display(), "Opened peer store");
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> ParleyResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ParleyError::Memory(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> ParleyResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| ParleyError::Memory(e.to_string()))?;
        run_migrations(&conn).map_err(|e| ParleyError::Memory(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or update a record.
    pub fn upsert(&self, record: &PeerRecord) -> ParleyResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO peers (id, ip, port, last_seen_us) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET ip = ?2, port = ?3,
                 last_seen_us = MAX(last_seen_us, ?4)",
            rusqlite::params![
                record.id,
                record.ip,
                record.port,
                record.last_seen.timestamp_micros()
            ],
        )
        .map_err(|e| ParleyError::Memory(e.to_string()))?;
        Ok(())
    }

    /// Advance `last_seen` for an existing record. Returns `false` if the id
    /// is unknown.
    pub fn touch(&self, id: &str, seen: DateTime<Utc>) -> ParleyResult<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Internal(e.to_string()))?;
        let changed = conn
            .execute(
                "UPDATE peers SET last_seen_us = MAX(last_seen_us, ?2) WHERE id = ?1",
                rusqlite::params![id, seen.timestamp_micros()],
            )
            .map_err(|e| ParleyError::Memory(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Fetch a single record.
    pub fn get(&self, id: &str) -> ParleyResult<Option<PeerRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Internal(e.to_string()))?;
        let row = conn
            .query_row(
                "SELECT id, ip, port, last_seen_us FROM peers WHERE id = ?1",
                rusqlite::params![id],
                row_to_parts,
            )
            .optional()
            .map_err(|e| ParleyError::Memory(e.to_string()))?;
        row.map(parts_to_record).transpose()
    }

    /// Load every stored record, ordered by id.
    pub fn load_all(&self) -> ParleyResult<Vec<PeerRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Internal(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT id, ip, port, last_seen_us FROM peers ORDER BY id")
            .map_err(|e| ParleyError::Memory(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_parts)
            .map_err(|e| ParleyError::Memory(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let parts = row.map_err(|e| ParleyError::Memory(e.to_string()))?;
            records.push(parts_to_record(parts)?);
        }
        Ok(records)
    }

    /// Delete records last seen strictly before `cutoff`. Returns how many
    /// were removed.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> ParleyResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Internal(e.to_string()))?;
        conn.execute(
            "DELETE FROM peers WHERE last_seen_us < ?1",
            rusqlite::params![cutoff.timestamp_micros()],
        )
        .map_err(|e| ParleyError::Memory(e.to_string()))
    }

    /// Number of stored records.
    pub fn count(&self) -> ParleyResult<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ParleyError::Internal(e.to_string()))?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM peers", [], |row| row.get(0))
            .map_err(|e| ParleyError::Memory(e.to_string()))?;
        Ok(n as usize)
    }
}

type RowParts = (String, String, u16, i64);

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowParts> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn parts_to_record((id, ip, port, last_seen_us): RowParts) -> ParleyResult<PeerRecord> {
    let last_seen = DateTime::<Utc>::from_timestamp_micros(last_seen_us).ok_or_else(|| {
        ParleyError::Serialization(format!("invalid last_seen_us {last_seen_us} for peer {id}"))
    })?;
    Ok(PeerRecord {
        id,
        ip,
        port,
        last_seen,
    })
}
