//! ChatNode: TCP listener and dialer for Parley chat sessions.
//!
//! A [`ChatNode`] binds a local TCP listener and accepts incoming
//! connections. It also dials out to peers with the `CHAT_REQUEST` /
//! `ACCEPT` handshake. Every connection gets a reader task that forwards
//! chunks into the node's inbound queue.
//!
//! Inbound connections are handled according to
//! [`InboundMode`](parley_types::config::InboundMode): in `Raw` mode they
//! skip the handshake and their bytes are tagged with the unassociated
//! sentinel; in `Handshake` mode the [`ChatHandle`] decides whether to
//! accept, and accepted connections become ordinary sessions.

use crate::error::WireError;
use crate::message::{
    encode_chat_request, handshake_outcome, parse_chat_request, HandshakeOutcome, ACCEPT,
    DECLINE, READ_CHUNK_SIZE,
};
use crate::queue::{inbound_queue, InboundReceiver, InboundSender};
use crate::session::{SessionHandle, SessionTable};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parley_types::config::{ChatConfig, InboundMode};
use parley_types::peer::PeerRecord;
use parley_types::session::{
    CloseReason, InboundMessage, SessionDirection, SessionEvent, SessionId, SessionInfo,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the session event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Accept policy for inbound handshakes.
///
/// Only consulted when the node runs in `Handshake` inbound mode.
#[async_trait]
pub trait ChatHandle: Send + Sync + 'static {
    /// Decide whether to accept a chat from `remote_id` (as declared in its
    /// request; nothing verifies it).
    async fn accept_chat(&self, remote_id: &str, remote_addr: SocketAddr) -> bool;
}

/// Accepts every chat request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl ChatHandle for AcceptAll {
    async fn accept_chat(&self, _remote_id: &str, _remote_addr: SocketAddr) -> bool {
        true
    }
}

/// The local chat endpoint - listens for connections and dials peers.
pub struct ChatNode {
    config: ChatConfig,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
    sessions: Arc<SessionTable>,
    /// Taken on shutdown so the inbound queue closes once readers exit.
    inbound: Mutex<Option<InboundSender>>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: CancellationToken,
    handle: Arc<dyn ChatHandle>,
}

impl ChatNode {
    /// Bind the listener and start the accept loop.
    ///
    /// Returns the node, the single consumer of its inbound queue, and the
    /// accept loop's task handle.
    pub async fn start(
        config: ChatConfig,
        handle: Arc<dyn ChatHandle>,
    ) -> Result<(Arc<Self>, InboundReceiver, tokio::task::JoinHandle<()>), WireError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            node_id = %config.node_id,
            mode = ?config.inbound_mode,
            "Chat listener bound"
        );

        let (inbound_tx, inbound_rx) = inbound_queue(config.inbound_queue_capacity);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let node = Arc::new(Self {
            config,
            local_addr,
            sessions: Arc::new(SessionTable::new()),
            inbound: Mutex::new(Some(inbound_tx.clone())),
            events,
            shutdown: CancellationToken::new(),
            handle,
        });

        let node_clone = Arc::clone(&node);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, node_clone, inbound_tx).await;
        });

        Ok((node, inbound_rx, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Identity this node declares when dialing.
    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The session table.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Subscribe to session open/close notifications.
    ///
    /// Nothing is buffered for nodes without subscribers; a subscriber that
    /// falls behind by more than 256 events sees `Lagged`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Dial `peer_ip:peer_port`, declare `self_id`, and open a session if the
    /// peer answers `ACCEPT`.
    pub async fn start_chat(
        &self,
        peer_ip: &str,
        peer_port: u16,
        self_id: &str,
    ) -> Result<SessionId, WireError> {
        let ip: IpAddr = peer_ip.parse().map_err(|_| {
            WireError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid peer address: {peer_ip}"),
            ))
        })?;
        self.dial(SocketAddr::new(ip, peer_port), self_id, "").await
    }

    /// [`start_chat`](Self::start_chat) for an already-resolved address.
    pub async fn start_chat_addr(
        &self,
        addr: SocketAddr,
        self_id: &str,
    ) -> Result<SessionId, WireError> {
        self.dial(addr, self_id, "").await
    }

    /// Dial a peer taken from the registry, declaring this node's id. The
    /// session records the registry id as the remote identity.
    pub async fn start_chat_peer(&self, peer: &PeerRecord) -> Result<SessionId, WireError> {
        let addr = peer.socket_addr().ok_or_else(|| {
            WireError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("peer {} has invalid address {}", peer.id, peer.ip),
            ))
        })?;
        self.dial(addr, &self.config.node_id, &peer.id).await
    }

    /// Write `text` to a session. No framing is added.
    pub async fn send(&self, session_id: SessionId, text: &str) -> Result<(), WireError> {
        self.send_bytes(session_id, text.as_bytes()).await
    }

    /// Write raw bytes to a session.
    pub async fn send_bytes(&self, session_id: SessionId, bytes: &[u8]) -> Result<(), WireError> {
        self.sessions.send(session_id, bytes).await?;
        debug!(session_id = %session_id, len = bytes.len(), "Sent");
        Ok(())
    }

    /// Close a session: stop its reader, close the socket, drop the entry.
    pub async fn close(&self, session_id: SessionId) -> Result<(), WireError> {
        let handle = self.sessions.close(session_id).await?;
        info!(session_id = %session_id, "Session closed");
        if handle.mark_close_reported() {
            let _ = self.events.send(SessionEvent::Closed {
                id: session_id,
                reason: CloseReason::LocalClose,
            });
        }
        Ok(())
    }

    /// Stop the accept loop and every reader, and close all sessions.
    ///
    /// The inbound queue yields `None` once the last reader has exited.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!(node_id = %self.config.node_id, "Chat node shutting down");
        self.shutdown.cancel();
        self.take_inbound();

        for handle in self.sessions.drain() {
            handle.shutdown().await;
            if handle.mark_close_reported() {
                let _ = self.events.send(SessionEvent::Closed {
                    id: handle.id(),
                    reason: CloseReason::Shutdown,
                });
            }
        }
    }

    fn inbound_sender(&self) -> Result<InboundSender, WireError> {
        self.inbound
            .lock()
            .map_err(|_| WireError::ShuttingDown)?
            .clone()
            .ok_or(WireError::ShuttingDown)
    }

    fn take_inbound(&self) {
        if let Ok(mut guard) = self.inbound.lock() {
            guard.take();
        }
    }

    /// Outbound handshake.
    async fn dial(
        &self,
        addr: SocketAddr,
        self_id: &str,
        remote_id: &str,
    ) -> Result<SessionId, WireError> {
        let inbound = self.inbound_sender()?;

        info!(peer = %addr, "Connecting to peer");
        let connect_timeout = self.config.connect_timeout();
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result?,
            Err(_) => return Err(WireError::connect_timeout(connect_timeout)),
        };
        let (mut reader, mut writer) = stream.into_split();

        writer.write_all(&encode_chat_request(self_id)).await?;
        writer.flush().await?;

        let handshake_timeout = self.config.handshake_timeout();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let n = match tokio::time::timeout(handshake_timeout, reader.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(peer = %addr, timeout = ?handshake_timeout, "Handshake timed out");
                return Err(WireError::HandshakeTimeout(handshake_timeout));
            }
        };

        if let HandshakeOutcome::Declined(response) = handshake_outcome(&buf[..n]) {
            warn!(peer = %addr, response = %response, "Chat declined");
            let _ = writer.shutdown().await;
            return Err(WireError::ChatDeclined { response });
        }

        let session_id = self.open_session(
            reader,
            Box::new(writer),
            addr,
            remote_id.to_string(),
            SessionDirection::Outbound,
            inbound,
        );

        // Lost a race with shutdown: the reader is already cancelled.
        if self.shutdown.is_cancelled() {
            if let Some(handle) = self.sessions.remove(session_id) {
                handle.shutdown().await;
            }
            return Err(WireError::ShuttingDown);
        }

        Ok(session_id)
    }

    /// Register a session and start its reader.
    fn open_session<R>(
        &self,
        reader: R,
        writer: crate::session::BoxedWriter,
        remote_addr: SocketAddr,
        remote_id: String,
        direction: SessionDirection,
        inbound: InboundSender,
    ) -> SessionId
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = self.sessions.next_id();
        let cancel = self.shutdown.child_token();
        let info = SessionInfo {
            id,
            remote_id,
            remote_addr,
            direction,
            opened_at: Utc::now(),
        };

        info!(
            session_id = %id,
            peer = %remote_addr,
            remote_id = %info.remote_id,
            direction = ?direction,
            "Session opened"
        );

        self.sessions.insert(Arc::new(SessionHandle::new(
            info.clone(),
            writer,
            cancel.clone(),
        )));
        let _ = self.events.send(SessionEvent::Opened(info));

        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();
        let close_on_eof = self.config.close_on_eof;
        tokio::spawn(async move {
            let exit = read_loop(reader, id, &inbound, &cancel).await;
            session_reader_finished(id, exit, &sessions, &events, close_on_eof).await;
        });

        id
    }

    /// Internal accept loop - runs in a spawned task.
    async fn accept_loop(listener: TcpListener, node: Arc<ChatNode>, inbound: InboundSender) {
        loop {
            tokio::select! {
                _ = node.shutdown.cancelled() => {
                    debug!("Accept loop stopped");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(peer = %addr, "Accepted connection");
                        let node = Arc::clone(&node);
                        let inbound = inbound.clone();
                        tokio::spawn(async move {
                            node.handle_inbound(stream, addr, inbound).await;
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::select! {
                            _ = node.shutdown.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                    }
                }
            }
        }
    }

    /// Handle a single inbound connection according to the inbound mode.
    async fn handle_inbound(&self, stream: TcpStream, addr: SocketAddr, inbound: InboundSender) {
        match self.config.inbound_mode {
            InboundMode::Raw => {
                // No handshake: the whole stream is unassociated traffic.
                // Keep the write half open for as long as we read.
                let cancel = self.shutdown.child_token();
                let exit = read_loop(stream, SessionId::UNASSOCIATED, &inbound, &cancel).await;
                debug!(peer = %addr, exit = ?exit, "Unassociated connection ended");
            }
            InboundMode::Handshake => {
                if let Err(e) = self.accept_handshake(stream, addr, inbound).await {
                    debug!(peer = %addr, "Inbound handshake failed: {}", e);
                }
            }
        }
    }

    /// Responder side of the handshake.
    async fn accept_handshake(
        &self,
        mut stream: TcpStream,
        addr: SocketAddr,
        inbound: InboundSender,
    ) -> Result<(), WireError> {
        let handshake_timeout = self.config.handshake_timeout();
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let n = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(WireError::ShuttingDown),
            read = tokio::time::timeout(handshake_timeout, stream.read(&mut buf)) => match read {
                Ok(result) => result?,
                Err(_) => return Err(WireError::HandshakeTimeout(handshake_timeout)),
            },
        };

        let Some(remote_id) = parse_chat_request(&buf[..n]) else {
            warn!(peer = %addr, "Rejected connection without chat request");
            decline(&mut stream).await;
            return Ok(());
        };

        if !self.handle.accept_chat(&remote_id, addr).await {
            info!(peer = %addr, remote_id = %remote_id, "Declined chat request");
            decline(&mut stream).await;
            return Ok(());
        }

        if self.shutdown.is_cancelled() {
            decline(&mut stream).await;
            return Err(WireError::ShuttingDown);
        }

        stream.write_all(ACCEPT).await?;
        stream.flush().await?;

        let (reader, writer) = stream.into_split();
        let session_id = self.open_session(
            reader,
            Box::new(writer),
            addr,
            remote_id,
            SessionDirection::Inbound,
            inbound,
        );

        // Shutdown drained the table while this session was being opened.
        if self.shutdown.is_cancelled() {
            if let Some(handle) = self.sessions.remove(session_id) {
                handle.shutdown().await;
            }
            return Err(WireError::ShuttingDown);
        }
        Ok(())
    }
}

async fn decline<W: AsyncWrite + Unpin>(stream: &mut W) {
    let _ = stream.write_all(DECLINE).await;
    let _ = stream.shutdown().await;
}

/// Why a reader stopped.
#[derive(Debug)]
enum ReaderExit {
    Eof,
    Error(std::io::Error),
    Cancelled,
    QueueClosed,
}

/// Forward chunks from `reader` into the inbound queue until end-of-stream,
/// error, cancellation, or the consumer going away.
async fn read_loop<R>(
    mut reader: R,
    session_id: SessionId,
    inbound: &InboundSender,
    cancel: &CancellationToken,
) -> ReaderExit
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return ReaderExit::Cancelled,
            read = reader.read(&mut buf) => match read {
                Ok(0) => return ReaderExit::Eof,
                Ok(n) => n,
                Err(e) => return ReaderExit::Error(e),
            },
        };

        let msg = InboundMessage::new(session_id, Bytes::copy_from_slice(&buf[..n]));
        tokio::select! {
            _ = cancel.cancelled() => return ReaderExit::Cancelled,
            delivered = inbound.push(msg) => {
                if !delivered {
                    return ReaderExit::QueueClosed;
                }
            }
        }
    }
}

/// Bookkeeping after a session reader exits.
async fn session_reader_finished(
    id: SessionId,
    exit: ReaderExit,
    sessions: &SessionTable,
    events: &broadcast::Sender<SessionEvent>,
    close_on_eof: bool,
) {
    let reason = match exit {
        // close() or shutdown() report their own closure.
        ReaderExit::Cancelled => return,
        ReaderExit::QueueClosed => {
            debug!(session_id = %id, "Inbound queue closed, reader stopped");
            return;
        }
        ReaderExit::Eof => {
            debug!(session_id = %id, "Peer closed the connection");
            CloseReason::RemoteClosed
        }
        ReaderExit::Error(e) => {
            debug!(session_id = %id, "Read error: {}", e);
            CloseReason::ReadError
        }
    };

    let handle = if close_on_eof {
        sessions.close(id).await.ok()
    } else {
        sessions.get(id)
    };

    if let Some(handle) = handle {
        if handle.mark_close_reported() {
            let _ = events.send(SessionEvent::Closed { id, reason });
        }
    }
}
