//! `parley node` - register with the daemon and chat interactively.

use crate::client::{Heartbeat, RendezvousClient};
use crate::cmd::peers::peer_table;
use crate::ui;
use parley_kernel::config::load_config;
use parley_types::config::InboundMode;
use parley_types::session::{SessionEvent, SessionId};
use parley_wire::{AcceptAll, ChatNode};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// How often the node refreshes its registry entry.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

const HELP: &str = "\
/peers                  list active peers
/chat <peer-id>         open a chat with a registered peer
/connect <ip:port>      open a chat by address
/send <session> <text>  send text on a session
/close <session>        close a session
/sessions               list open sessions
/quit                   leave
<text>                  send to the most recently opened session";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    Peers,
    Chat(String),
    Connect(SocketAddr),
    Send(SessionId, String),
    Say(String),
    Close(SessionId),
    Sessions,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> NodeCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return NodeCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return NodeCommand::Say(line.to_string());
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim_start()),
        None => (rest, ""),
    };

    let session = |s: &str| s.trim().parse::<u64>().ok().map(SessionId);

    match name {
        "peers" => NodeCommand::Peers,
        "sessions" => NodeCommand::Sessions,
        "help" => NodeCommand::Help,
        "quit" | "exit" => NodeCommand::Quit,
        "chat" if !args.trim().is_empty() => NodeCommand::Chat(args.trim().to_string()),
        "connect" => match args.trim().parse() {
            Ok(addr) => NodeCommand::Connect(addr),
            Err(_) => NodeCommand::Invalid("usage: /connect <ip:port>".to_string()),
        },
        "send" => match args
            .split_once(char::is_whitespace)
            .and_then(|(id, text)| Some((session(id)?, text)))
        {
            Some((id, text)) if !text.is_empty() => NodeCommand::Send(id, text.to_string()),
            _ => NodeCommand::Invalid("usage: /send <session> <text>".to_string()),
        },
        "close" => match session(args) {
            Some(id) => NodeCommand::Close(id),
            None => NodeCommand::Invalid("usage: /close <session>".to_string()),
        },
        "chat" => NodeCommand::Invalid("usage: /chat <peer-id>".to_string()),
        other => NodeCommand::Invalid(format!("unknown command /{other} (try /help)")),
    }
}

/// Interactive state shared by command handlers.
struct NodeShell {
    node: Arc<ChatNode>,
    client: RendezvousClient,
    /// Target for bare text.
    current: Option<SessionId>,
}

impl NodeShell {
    /// Run one command. Returns `false` when the node should exit.
    async fn execute(&mut self, cmd: NodeCommand) -> bool {
        match cmd {
            NodeCommand::Empty => {}
            NodeCommand::Quit => return false,
            NodeCommand::Help => println!("{HELP}"),
            NodeCommand::Invalid(msg) => ui::error(&msg),
            NodeCommand::Peers => match self.client.peers().await {
                Ok(peers) if peers.is_empty() => ui::hint("No active peers found."),
                Ok(peers) => peer_table(&peers).print(),
                Err(e) => ui::error(&e),
            },
            NodeCommand::Sessions => {
                let sessions = self.node.sessions().sessions();
                if sessions.is_empty() {
                    ui::hint("No open sessions.");
                }
                for s in sessions {
                    let who = if s.remote_id.is_empty() {
                        "?"
                    } else {
                        s.remote_id.as_str()
                    };
                    println!("  #{} {} {} ({:?})", s.id, who, s.remote_addr, s.direction);
                }
            }
            NodeCommand::Chat(peer_id) => {
                let peers = match self.client.peers().await {
                    Ok(p) => p,
                    Err(e) => {
                        ui::error(&e);
                        return true;
                    }
                };
                match peers.iter().find(|p| p.id == peer_id) {
                    Some(peer) => {
                        let result = self.node.start_chat_peer(peer).await;
                        self.opened(result);
                    }
                    None => ui::error(&format!("{peer_id} is not an active peer")),
                }
            }
            NodeCommand::Connect(addr) => {
                let node = &self.node;
                let result = node.start_chat_addr(addr, node.node_id()).await;
                self.opened(result);
            }
            NodeCommand::Send(id, text) => self.send(id, &text).await,
            NodeCommand::Say(text) => match self.current {
                Some(id) => self.send(id, &text).await,
                None => ui::error("No session yet. Use /chat <peer-id> or /connect <ip:port>."),
            },
            NodeCommand::Close(id) => match self.node.close(id).await {
                Ok(()) => {
                    if self.current == Some(id) {
                        self.current = None;
                    }
                }
                Err(e) => ui::error(&e.to_string()),
            },
        }
        true
    }

    fn opened(&mut self, result: Result<SessionId, parley_wire::WireError>) {
        match result {
            // The Opened event announces it.
            Ok(id) => self.current = Some(id),
            Err(e) => ui::error(&e.to_string()),
        }
    }

    async fn send(&self, id: SessionId, text: &str) {
        if let Err(e) = self.node.send(id, text).await {
            ui::error(&e.to_string());
        }
    }
}

pub async fn cmd_node(
    config: Option<PathBuf>,
    id: Option<String>,
    port: Option<u16>,
    server: &str,
    inbound_mode: Option<InboundMode>,
) {
    let mut chat = load_config(config.as_deref()).chat;
    if let Some(id) = id {
        chat.node_id = id;
    }
    if let Some(port) = port {
        chat.listen_addr.set_port(port);
    }
    if let Some(mode) = inbound_mode {
        chat.inbound_mode = mode;
    }

    let client = match RendezvousClient::new(server) {
        Ok(c) => c,
        Err(e) => ui::fatal(&e),
    };
    let (node, mut inbound, accept_task) = match ChatNode::start(chat, Arc::new(AcceptAll)).await
    {
        Ok(started) => started,
        Err(e) => ui::fatal(&format!("Cannot start chat listener: {e}")),
    };
    let node_id = node.node_id().to_string();
    let chat_port = node.local_addr().port();

    ui::section(&format!("Parley node '{node_id}'"));
    ui::kv("Listening", &node.local_addr().to_string());
    ui::kv("Inbound", &format!("{:?}", node.config().inbound_mode).to_lowercase());
    match client.register(&node_id, chat_port).await {
        Ok(ip) => ui::kv("Registered", &format!("{ip}:{chat_port} at {}", client.base())),
        Err(e) => ui::error(&format!("{e} (chat still works by address)")),
    }
    ui::hint("Type /help for commands.");

    let heartbeat = tokio::spawn(heartbeat_loop(client.clone(), node_id, chat_port));
    let mut events = node.subscribe_events();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut shell = NodeShell {
        node: Arc::clone(&node),
        client,
        current: None,
    };

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !shell.execute(parse_command(&line)).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    ui::error(&format!("stdin: {e}"));
                    break;
                }
            },
            msg = inbound.recv() => match msg {
                Some(msg) => ui::incoming(msg.session_id.0, &msg.text()),
                None => break,
            },
            event = events.recv() => match event {
                Ok(SessionEvent::Opened(info)) => {
                    if shell.current.is_none() {
                        shell.current = Some(info.id);
                    }
                    ui::success(&format!(
                        "Session #{} with {} ({})",
                        info.id,
                        if info.remote_id.is_empty() { "?" } else { &info.remote_id },
                        info.remote_addr
                    ));
                }
                Ok(SessionEvent::Closed { id, reason }) => {
                    ui::hint(&format!("Session #{id} closed ({reason:?})"));
                    if shell.current == Some(id) {
                        shell.current = None;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Session events lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    heartbeat.abort();
    node.shutdown().await;
    let _ = accept_task.await;
    ui::success("Bye");
}

/// Keep the registry entry fresh; re-register if the daemon forgot us.
async fn heartbeat_loop(client: RendezvousClient, id: String, port: u16) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match client.heartbeat(&id).await {
            Ok(Heartbeat::Ok(_)) => {}
            Ok(Heartbeat::Unknown) => {
                warn!(peer = %id, "Daemon does not know us, re-registering");
                if let Err(e) = client.register(&id, port).await {
                    warn!("{e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }
}
