//! Peer discovery over the neighbor list: HELLO, GET_PEERS, LS search and BYE.

use std::path::Path;

use eachare_core::{FileCatalog, Message, MessageType, Peer, PeerEntry, PeerStatus};
use tracing::{debug, info, warn};

use crate::connection::{self, NetError};
use crate::node::Node;

/// Load `host:port` lines as OFFLINE neighbors with clock 0. Blank lines are skipped.
pub fn load_neighbors(node: &Node, path: &Path) -> std::io::Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let mut added = 0;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line == node.address() {
            continue;
        }
        node.peers().add(Peer::new(line, PeerStatus::Offline, 0));
        info!(peer = %line, status = %PeerStatus::Offline, "neighbor added");
        added += 1;
    }
    Ok(added)
}

/// Apply PEERS_LIST entries. A known peer is overwritten only by an entry whose clock
/// is at least the stored one; unknown peers are inserted as received.
pub fn merge_peer_entries(node: &Node, entries: &[PeerEntry]) {
    for entry in entries {
        if entry.address == node.address() {
            continue;
        }
        let previous = node.peers().update(&entry.address, |known| match known {
            Some(k) if entry.clock < k.clock => None,
            _ => Some(Peer::new(entry.address.clone(), entry.status, entry.clock)),
        });
        match previous {
            Some(known) if entry.clock < known.clock => {
                debug!(peer = %entry.address, stored = known.clock, received = entry.clock, "stale peer entry ignored");
            }
            Some(known) => {
                if known.status != entry.status {
                    info!(peer = %entry.address, status = %entry.status, "peer status updated");
                }
            }
            None => {
                info!(peer = %entry.address, status = %entry.status, "peer added");
            }
        }
    }
}

/// Send HELLO to one peer.
pub async fn hello(node: &Node, destination: &str) -> Result<(), NetError> {
    let msg = Message::new(node.address(), MessageType::Hello);
    connection::notify(node, destination, msg, node.settings().gossip_timeout).await
}

/// Ask every known peer for its peer table and merge the answers.
/// Returns how many peers answered.
pub async fn get_peers(node: &Node) -> usize {
    let mut answered = 0;
    for peer in node.peers().get_all() {
        let msg = Message::new(node.address(), MessageType::GetPeers);
        let reply = match connection::request(
            node,
            &peer.address,
            msg,
            node.settings().gossip_timeout,
        )
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                debug!(peer = %peer.address, error = %e, "GET_PEERS failed");
                continue;
            }
        };
        match reply.peer_entries() {
            Ok(entries) => {
                merge_peer_entries(node, &entries);
                answered += 1;
            }
            Err(e) => warn!(peer = %peer.address, error = %e, "bad PEERS_LIST reply"),
        }
    }
    answered
}

/// Ask every ONLINE peer for its file listing.
pub async fn search(node: &Node) -> FileCatalog {
    let mut catalog = FileCatalog::new();
    for peer in node.peers().get_all() {
        if !peer.status.is_online() {
            continue;
        }
        let msg = Message::new(node.address(), MessageType::Ls);
        let reply = match connection::request(
            node,
            &peer.address,
            msg,
            node.settings().gossip_timeout,
        )
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                debug!(peer = %peer.address, error = %e, "LS failed");
                continue;
            }
        };
        match reply.file_entries() {
            Ok(files) => {
                for f in files {
                    catalog.merge(&f.name, f.size, &peer.address);
                }
            }
            Err(e) => warn!(peer = %peer.address, error = %e, "bad LS_LIST reply"),
        }
    }
    catalog
}

/// Say BYE to every ONLINE peer. Failures are only logged.
pub async fn bye(node: &Node) {
    for peer in node.peers().get_all() {
        if !peer.status.is_online() {
            continue;
        }
        let msg = Message::new(node.address(), MessageType::Bye);
        if let Err(e) =
            connection::notify(node, &peer.address, msg, node.settings().gossip_timeout).await
        {
            debug!(peer = %peer.address, error = %e, "BYE failed");
        }
    }
}
