//! One TCP connection per message: stamp, send, receive, and keep the peer table
//! in step with what each exchange reveals about the other side.

use std::time::Duration;

use eachare_core::protocol::MessageType;
use eachare_core::wire::{self, WireError, MAX_LINE_LEN};
use eachare_core::{Message, Peer, PeerStatus};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::node::Node;

/// Connectivity or protocol failure on one exchange.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("not connected to {0}")]
    NotConnected(String),
    #[error("timed out")]
    Timeout,
    #[error("connection closed before a full message arrived")]
    Closed,
    #[error("message longer than {0} bytes")]
    TooLong(usize),
    #[error("malformed message: {0}")]
    Wire(#[from] WireError),
    #[error("unexpected {0} reply")]
    UnexpectedReply(MessageType),
    #[error("asked for chunk {expected}, got chunk {got}")]
    ChunkMismatch { expected: u64, got: u64 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open a TCP connection within `timeout`.
pub async fn dial(address: &str, timeout: Duration) -> Result<TcpStream, NetError> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(NetError::Io(e)),
        Err(_) => Err(NetError::Timeout),
    }
}

/// Stamp `message` with a fresh clock value and write it to `conn`.
///
/// A missing connection counts as a failed write. Either way the outcome is a health
/// check of `destination`: a failure flips a known ONLINE peer to OFFLINE, a success
/// flips a known OFFLINE peer to ONLINE. Unknown destinations are left alone.
pub async fn send_message<W>(
    node: &Node,
    conn: Option<&mut W>,
    message: &mut Message,
    destination: &str,
) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    message.clock = node.clock().tick();
    debug!(clock = message.clock, "clock advanced");
    let line = wire::encode(message);
    debug!(peer = %destination, message = %message, "forwarding message");

    let result = match conn {
        Some(w) => write_line(w, &line).await,
        None => Err(NetError::NotConnected(destination.to_string())),
    };

    let wanted = if result.is_ok() {
        PeerStatus::Online
    } else {
        PeerStatus::Offline
    };
    let previous = node.peers().update(destination, |known| {
        known
            .filter(|k| k.status != wanted)
            .map(|k| Peer::new(k.address.clone(), wanted, k.clock))
    });
    if previous.is_some_and(|p| p.status != wanted) {
        info!(peer = %destination, status = %wanted, "peer status updated");
    }
    result
}

async fn write_line<W>(w: &mut W, line: &str) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(line.as_bytes()).await?;
    w.flush().await?;
    Ok(())
}

/// Read one line, decode it, merge its clock and record the sender as ONLINE.
///
/// A known sender keeps the larger of its stored and received clocks. Any read or
/// decode failure is returned; it only concerns this connection.
pub async fn receive_message<R>(node: &Node, reader: &mut R) -> Result<Message, NetError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_line(&mut line)
        .await?;
    if n == 0 {
        return Err(NetError::Closed);
    }
    if n == MAX_LINE_LEN && !line.ends_with('\n') {
        return Err(NetError::TooLong(MAX_LINE_LEN));
    }
    let message = wire::decode(&line)?;
    debug!(peer = %message.origin, kind = %message.kind, "message received");

    let clock = node.clock().merge(message.clock);
    debug!(clock, "clock advanced");

    let previous = node.peers().update(&message.origin, |known| {
        let clock = known.map_or(message.clock, |k| k.clock.max(message.clock));
        Some(Peer::new(message.origin.clone(), PeerStatus::Online, clock))
    });
    match previous {
        None => {
            info!(peer = %message.origin, status = %PeerStatus::Online, "peer added");
        }
        Some(known) if !known.status.is_online() && message.kind != MessageType::Bye => {
            info!(peer = %message.origin, status = %PeerStatus::Online, "peer status updated");
        }
        Some(_) => {}
    }
    Ok(message)
}

/// Send `message` to `destination` without waiting for a reply (HELLO, BYE).
pub async fn notify(
    node: &Node,
    destination: &str,
    mut message: Message,
    timeout: Duration,
) -> Result<(), NetError> {
    let mut stream = match dial(destination, timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = send_message::<TcpStream>(node, None, &mut message, destination).await;
            return Err(e);
        }
    };
    match tokio::time::timeout(
        timeout,
        send_message(node, Some(&mut stream), &mut message, destination),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(NetError::Timeout),
    }
}

/// Send `message` to `destination` and wait for one reply on the same connection.
/// Dial, write and read all share `timeout`.
pub async fn request(
    node: &Node,
    destination: &str,
    mut message: Message,
    timeout: Duration,
) -> Result<Message, NetError> {
    let stream = match dial(destination, timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = send_message::<TcpStream>(node, None, &mut message, destination).await;
            return Err(e);
        }
    };
    let exchange = async {
        let mut stream = BufReader::new(stream);
        send_message(node, Some(stream.get_mut()), &mut message, destination).await?;
        receive_message(node, &mut stream).await
    };
    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(NetError::Timeout),
    }
}
