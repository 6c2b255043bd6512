//! `parley peers` - list active peers.

use crate::client::{parse_peers, RendezvousClient};
use crate::table::Table;
use crate::ui;
use parley_types::peer::PeerRecord;

pub async fn cmd_peers(server: &str, json: bool) {
    let client = match RendezvousClient::new(server) {
        Ok(c) => c,
        Err(e) => ui::fatal(&e),
    };
    let body = match client.peers_json().await {
        Ok(b) => b,
        Err(e) => ui::fatal(&e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
        return;
    }

    match parse_peers(body) {
        Ok(peers) if peers.is_empty() => ui::hint("No active peers found."),
        Ok(peers) => peer_table(&peers).print(),
        Err(e) => ui::fatal(&e),
    }
}

pub fn peer_table(peers: &[PeerRecord]) -> Table {
    let mut table = Table::new(&["ID", "ADDRESS", "LAST SEEN"]);
    for peer in peers {
        table.add_row(&[
            peer.id.clone(),
            format!("{}:{}", peer.ip, peer.port),
            peer.last_seen.format("%H:%M:%S").to_string(),
        ]);
    }
    table
}
