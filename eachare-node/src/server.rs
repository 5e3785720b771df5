//! Inbound side: accept loop, one task per connection, one message per connection.

use std::sync::Arc;
use std::time::Duration;

use eachare_core::chunk::encode_payload;
use eachare_core::{ChunkPayload, Message, MessageType, PeerEntry, PeerStatus, MAX_CHUNK_SIZE};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::connection::{self, NetError};
use crate::gossip;
use crate::node::Node;
use crate::shared;

/// Pause after a failed accept, so descriptor exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections for the life of the process. Each connection is served on its
/// own task. Accept errors (descriptor exhaustion, aborted handshakes) are logged and
/// the loop carries on.
pub async fn run(node: Arc<Node>, listener: TcpListener) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let node = node.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(&node, stream).await {
                debug!(remote = %remote, error = %e, "connection dropped");
            }
        });
    }
}

async fn handle_connection(node: &Node, stream: TcpStream) -> Result<(), NetError> {
    let mut stream = BufReader::new(stream);
    let received = tokio::time::timeout(
        node.settings().request_timeout,
        connection::receive_message(node, &mut stream),
    )
    .await
    .unwrap_or(Err(NetError::Timeout));
    let message = match received {
        Ok(m) => m,
        Err(NetError::Wire(e)) => {
            warn!(error = %e, "malformed message");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let sender = message.origin.clone();
    if let Some(mut reply) = dispatch(node, &message).await {
        connection::send_message(node, Some(stream.get_mut()), &mut reply, &sender).await?;
    }
    Ok(())
}

/// Act on one inbound message and build the reply, if the type has one.
pub async fn dispatch(node: &Node, message: &Message) -> Option<Message> {
    match message.kind {
        MessageType::Hello => None,
        MessageType::GetPeers => {
            let entries: Vec<PeerEntry> = node
                .peers()
                .get_all()
                .iter()
                .filter(|p| p.address != message.origin)
                .map(PeerEntry::from)
                .collect();
            Some(Message::peers_list(node.address(), &entries))
        }
        MessageType::PeersList => {
            match message.peer_entries() {
                Ok(entries) => gossip::merge_peer_entries(node, &entries),
                Err(e) => warn!(peer = %message.origin, error = %e, "bad PEERS_LIST"),
            }
            None
        }
        MessageType::Ls => match shared::list(node.shared_dir()).await {
            Ok(files) => Some(Message::ls_list(node.address(), &files)),
            Err(e) => {
                warn!(error = %e, "cannot list shared directory");
                Some(Message::ls_list(node.address(), &[]))
            }
        },
        MessageType::Dl => serve_chunk(node, message).await,
        MessageType::Bye => {
            node.peers().set_status(&message.origin, PeerStatus::Offline);
            info!(peer = %message.origin, status = %PeerStatus::Offline, "peer status updated");
            None
        }
        MessageType::File | MessageType::LsList => {
            debug!(peer = %message.origin, kind = %message.kind, "unsolicited message ignored");
            None
        }
    }
}

async fn serve_chunk(node: &Node, message: &Message) -> Option<Message> {
    let req = match message.parse_chunk_request() {
        Ok(r) => r,
        Err(e) => {
            warn!(peer = %message.origin, error = %e, "bad DL");
            return None;
        }
    };
    if req.chunk_size > MAX_CHUNK_SIZE {
        warn!(peer = %message.origin, chunk_size = req.chunk_size, "requested chunk size too large");
        return None;
    }
    match shared::read_chunk(node.shared_dir(), &req.file_name, req.chunk_size, req.index).await {
        Ok(Some(bytes)) => Some(Message::chunk_payload(
            node.address(),
            ChunkPayload {
                file_name: req.file_name,
                index: req.index,
                data: encode_payload(&bytes),
            },
        )),
        Ok(None) => {
            debug!(file = %req.file_name, chunk = req.index, "no such chunk");
            None
        }
        Err(e) => {
            warn!(file = %req.file_name, chunk = req.index, error = %e, "chunk read failed");
            None
        }
    }
}
