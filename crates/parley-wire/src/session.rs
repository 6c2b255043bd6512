//! Session table - the single source of truth for which sessions exist.
//!
//! Each entry owns the write half of its connection behind an async mutex,
//! so concurrent `send` calls on one session never interleave partial
//! writes. The read half belongs to the session's reader task and is not
//! stored here.

use crate::error::WireError;
use dashmap::DashMap;
use parley_types::session::{SessionId, SessionInfo};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Write half of a session's connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

fn session_closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "session closed")
}

/// One open session.
pub struct SessionHandle {
    info: SessionInfo,
    writer: Mutex<BoxedWriter>,
    cancel: CancellationToken,
    close_reported: AtomicBool,
}

impl SessionHandle {
    pub fn new(info: SessionInfo, writer: BoxedWriter, cancel: CancellationToken) -> Self {
        Self {
            info,
            writer: Mutex::new(writer),
            cancel,
            close_reported: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn id(&self) -> SessionId {
        self.info.id
    }

    /// Write all of `bytes` while holding this session's write lock.
    ///
    /// Cancelling the session aborts a write stuck on a peer that stopped
    /// reading; the caller gets `ConnectionAborted` and the lock is released.
    pub async fn write_all(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = tokio::select! {
            _ = self.cancel.cancelled() => return Err(session_closed()),
            guard = self.writer.lock() => guard,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(session_closed()),
            written = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => written,
        }
    }

    /// Stop the reader and close our side of the connection.
    ///
    /// Cancels first, so a pending `write_all` gives up the write lock.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Claim the right to report this session's closure. Only the first
    /// caller gets `true`.
    pub fn mark_close_reported(&self) -> bool {
        !self.close_reported.swap(true, Ordering::AcqRel)
    }
}

/// Concurrent map from session id to open session.
pub struct SessionTable {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    next_id: AtomicU64,
}

impl SessionTable {
    /// Empty table. The first issued id is 1.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next id. Ids are never reused within a process.
    pub fn next_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions.insert(handle.id(), handle);
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of open sessions, ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| entry.value().info().clone())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Write `bytes` to a session.
    ///
    /// An unknown id fails before any I/O happens.
    pub async fn send(&self, id: SessionId, bytes: &[u8]) -> Result<(), WireError> {
        let handle = self.get(id).ok_or(WireError::SessionNotFound(id))?;
        handle.write_all(bytes).await?;
        Ok(())
    }

    /// Remove a session and close its connection.
    pub async fn close(&self, id: SessionId) -> Result<Arc<SessionHandle>, WireError> {
        let handle = self.remove(id).ok_or(WireError::SessionNotFound(id))?;
        handle.shutdown().await;
        Ok(handle)
    }

    /// Remove every session, returning them for the caller to shut down.
    pub fn drain(&self) -> Vec<Arc<SessionHandle>> {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_types::session::SessionDirection;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn make_session(table: &SessionTable, remote_id: &str) -> (Arc<SessionHandle>, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(1024);
        let info = SessionInfo {
            id: table.next_id(),
            remote_id: remote_id.to_string(),
            remote_addr: "127.0.0.1:5001".parse().unwrap(),
            direction: SessionDirection::Outbound,
            opened_at: Utc::now(),
        };
        let handle = Arc::new(SessionHandle::new(
            info,
            Box::new(ours),
            CancellationToken::new(),
        ));
        table.insert(Arc::clone(&handle));
        (handle, theirs)
    }

    #[test]
    fn test_ids_are_sequential_and_start_at_one() {
        let table = SessionTable::new();
        assert_eq!(table.next_id(), SessionId(1));
        assert_eq!(table.next_id(), SessionId(2));
        assert_eq!(table.next_id(), SessionId(3));
    }

    #[tokio::test]
    async fn test_send_unknown_session() {
        let table = SessionTable::new();
        let err = table.send(SessionId(42), b"hello").await.unwrap_err();
        assert!(matches!(err, WireError::SessionNotFound(SessionId(42))));
    }

    #[tokio::test]
    async fn test_send_writes_bytes() {
        let table = SessionTable::new();
        let (handle, mut remote) = make_session(&table, "bob");
        table.send(handle.id(), b"hello ").await.unwrap();
        table.send(handle.id(), b"world").await.unwrap();

        let mut buf = vec![0u8; 11];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[tokio::test]
    async fn test_close_removes_and_cancels() {
        let table = SessionTable::new();
        let (handle, mut remote) = make_session(&table, "bob");
        let id = handle.id();

        table.close(id).await.unwrap();
        assert!(!table.contains(id));
        assert!(handle.cancel.is_cancelled());

        // Remote observes end-of-stream.
        let mut buf = [0u8; 8];
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);

        // Second close and a send after close both miss.
        assert!(matches!(
            table.close(id).await,
            Err(WireError::SessionNotFound(_))
        ));
        assert!(matches!(
            table.send(id, b"late").await,
            Err(WireError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_close() {
        let table = SessionTable::new();
        let (first, _r1) = make_session(&table, "a");
        table.close(first.id()).await.unwrap();
        let (second, _r2) = make_session(&table, "b");
        assert!(second.id() > first.id());
    }

    #[tokio::test]
    async fn test_snapshot_and_drain() {
        let table = SessionTable::new();
        let (_a, _ra) = make_session(&table, "a");
        let (_b, _rb) = make_session(&table, "b");
        let infos = table.sessions();
        assert_eq!(infos.len(), 2);
        assert!(infos[0].id < infos[1].id);
        assert_eq!(infos[0].remote_id, "a");

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_close_reported_once() {
        let table = SessionTable::new();
        let (ours, _theirs) = tokio::io::duplex(16);
        let handle = SessionHandle::new(
            SessionInfo {
                id: table.next_id(),
                remote_id: String::new(),
                remote_addr: "127.0.0.1:1".parse().unwrap(),
                direction: SessionDirection::Inbound,
                opened_at: Utc::now(),
            },
            Box::new(ours),
            CancellationToken::new(),
        );
        assert!(handle.mark_close_reported());
        assert!(!handle.mark_close_reported());
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let table = Arc::new(SessionTable::new());
        let (ours, mut remote) = tokio::io::duplex(64);
        let info = SessionInfo {
            id: table.next_id(),
            remote_id: "bob".into(),
            remote_addr: "127.0.0.1:5001".parse().unwrap(),
            direction: SessionDirection::Outbound,
            opened_at: Utc::now(),
        };
        let id = info.id;
        table.insert(Arc::new(SessionHandle::new(
            info,
            Box::new(ours),
            CancellationToken::new(),
        )));

        let chunk_a = vec![b'a'; 500];
        let chunk_b = vec![b'b'; 500];
        let t1 = {
            let table = Arc::clone(&table);
            let chunk = chunk_a.clone();
            tokio::spawn(async move { table.send(id, &chunk).await })
        };
        let t2 = {
            let table = Arc::clone(&table);
            let chunk = chunk_b.clone();
            tokio::spawn(async move { table.send(id, &chunk).await })
        };

        let mut received = vec![0u8; 1000];
        remote.read_exact(&mut received).await.unwrap();
        t1.await.unwrap().unwrap();
        t2.await.unwrap().unwrap();

        // Each 500-byte write arrives as one contiguous run.
        let first = received[0];
        assert!(received[..500].iter().all(|&b| b == first));
        assert!(received[500..].iter().all(|&b| b != first));
    }

    #[tokio::test]
    async fn test_close_interrupts_write_to_stalled_peer() {
        let table = Arc::new(SessionTable::new());
        // The far end is held but never read, so a large write blocks.
        let (handle, _remote) = make_session(&table, "bob");
        let id = handle.id();

        let sender = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.send(id, &vec![0u8; 1 << 20]).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        tokio::time::timeout(std::time::Duration::from_secs(3), table.close(id))
            .await
            .expect("close blocked behind a stalled write")
            .unwrap();
        let sent = tokio::time::timeout(std::time::Duration::from_secs(3), sender)
            .await
            .expect("write did not observe close")
            .unwrap();
        assert!(matches!(sent, Err(WireError::Connection(_))));
        assert!(!table.contains(id));
    }
}
