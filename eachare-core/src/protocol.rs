//! EACHare wire protocol: message types and typed argument payloads.

use std::fmt;
use std::str::FromStr;

use crate::peers::{Peer, PeerStatus};
use crate::wire::WireError;

/// Every message type on the wire. The text form is the token in the third field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Liveness check.
    Hello,
    /// Request for the responder's known-peer table.
    GetPeers,
    /// `<count> <addr:status:clock> ...`
    PeersList,
    /// Request for the responder's shared-file listing.
    Ls,
    /// `<count> <name:size> ...`
    LsList,
    /// `<fileName> <chunkSize> <chunkIndex>`: request for one chunk.
    Dl,
    /// `<fileName> 0 <chunkIndex> <base64>`: one chunk's content.
    File,
    /// Graceful departure.
    Bye,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Hello => "HELLO",
            MessageType::GetPeers => "GET_PEERS",
            MessageType::PeersList => "PEERS_LIST",
            MessageType::Ls => "LS",
            MessageType::LsList => "LS_LIST",
            MessageType::Dl => "DL",
            MessageType::File => "FILE",
            MessageType::Bye => "BYE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "HELLO" => MessageType::Hello,
            "GET_PEERS" => MessageType::GetPeers,
            "PEERS_LIST" => MessageType::PeersList,
            "LS" => MessageType::Ls,
            "LS_LIST" => MessageType::LsList,
            "DL" => MessageType::Dl,
            "FILE" => MessageType::File,
            "BYE" => MessageType::Bye,
            other => return Err(WireError::UnknownType(other.to_string())),
        })
    }
}

/// One protocol message. `clock` is stamped by the sender right before encoding.
/// Arguments must be non-empty and free of whitespace to survive the line encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub origin: String,
    pub clock: u64,
    pub kind: MessageType,
    pub args: Vec<String>,
}

/// Entry of a PEERS_LIST: `addr:status:clock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub address: String,
    pub status: PeerStatus,
    pub clock: u64,
}

impl From<&Peer> for PeerEntry {
    fn from(p: &Peer) -> Self {
        Self {
            address: p.address.clone(),
            status: p.status,
            clock: p.clock,
        }
    }
}

/// Entry of an LS_LIST: `name:size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}

/// Parsed DL arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    pub file_name: String,
    pub chunk_size: u64,
    pub index: u64,
}

/// Parsed FILE arguments. `data` stays base64 until assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    pub file_name: String,
    pub index: u64,
    pub data: String,
}

impl Message {
    /// Message with no arguments and an unstamped clock.
    pub fn new(origin: impl Into<String>, kind: MessageType) -> Self {
        Self::with_args(origin, kind, Vec::new())
    }

    pub fn with_args(origin: impl Into<String>, kind: MessageType, args: Vec<String>) -> Self {
        Self {
            origin: origin.into(),
            clock: 0,
            kind,
            args,
        }
    }

    pub fn peers_list<'a>(
        origin: impl Into<String>,
        peers: impl IntoIterator<Item = &'a PeerEntry>,
    ) -> Self {
        let items: Vec<String> = peers
            .into_iter()
            .map(|p| format!("{}:{}:{}", p.address, p.status, p.clock))
            .collect();
        Self::with_args(origin, MessageType::PeersList, counted(items))
    }

    pub fn ls_list<'a>(
        origin: impl Into<String>,
        files: impl IntoIterator<Item = &'a FileEntry>,
    ) -> Self {
        let items: Vec<String> = files
            .into_iter()
            .map(|f| format!("{}:{}", f.name, f.size))
            .collect();
        Self::with_args(origin, MessageType::LsList, counted(items))
    }

    pub fn chunk_request(origin: impl Into<String>, req: &ChunkRequest) -> Self {
        Self::with_args(
            origin,
            MessageType::Dl,
            vec![
                req.file_name.clone(),
                req.chunk_size.to_string(),
                req.index.to_string(),
            ],
        )
    }

    pub fn chunk_payload(origin: impl Into<String>, payload: ChunkPayload) -> Self {
        Self::with_args(
            origin,
            MessageType::File,
            vec![
                payload.file_name,
                "0".to_string(),
                payload.index.to_string(),
                payload.data,
            ],
        )
    }

    /// Entries of a PEERS_LIST. The address itself contains a `:`, so split from the right.
    pub fn peer_entries(&self) -> Result<Vec<PeerEntry>, WireError> {
        self.expect_kind(MessageType::PeersList)?;
        self.counted_items()?
            .iter()
            .map(|item| {
                let mut parts = item.rsplitn(3, ':');
                let (Some(clock), Some(status), Some(address)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(self.bad(format!("malformed peer entry {item:?}")));
                };
                Ok(PeerEntry {
                    address: address.to_string(),
                    status: status.parse().map_err(|e| self.bad(format!("{e}")))?,
                    clock: clock
                        .parse()
                        .map_err(|_| self.bad(format!("invalid clock in {item:?}")))?,
                })
            })
            .collect()
    }

    pub fn file_entries(&self) -> Result<Vec<FileEntry>, WireError> {
        self.expect_kind(MessageType::LsList)?;
        self.counted_items()?
            .iter()
            .map(|item| {
                let (name, size) = item
                    .rsplit_once(':')
                    .ok_or_else(|| self.bad(format!("malformed file entry {item:?}")))?;
                Ok(FileEntry {
                    name: name.to_string(),
                    size: size
                        .parse()
                        .map_err(|_| self.bad(format!("invalid size in {item:?}")))?,
                })
            })
            .collect()
    }

    pub fn parse_chunk_request(&self) -> Result<ChunkRequest, WireError> {
        self.expect_kind(MessageType::Dl)?;
        let [file_name, chunk_size, index] = self.args.as_slice() else {
            return Err(self.bad(format!("expected 3 arguments, got {}", self.args.len())));
        };
        Ok(ChunkRequest {
            file_name: file_name.clone(),
            chunk_size: chunk_size
                .parse()
                .map_err(|_| self.bad(format!("invalid chunk size {chunk_size:?}")))?,
            index: index
                .parse()
                .map_err(|_| self.bad(format!("invalid chunk index {index:?}")))?,
        })
    }

    pub fn parse_chunk_payload(&self) -> Result<ChunkPayload, WireError> {
        self.expect_kind(MessageType::File)?;
        let [file_name, _, index, data] = self.args.as_slice() else {
            return Err(self.bad(format!("expected 4 arguments, got {}", self.args.len())));
        };
        Ok(ChunkPayload {
            file_name: file_name.clone(),
            index: index
                .parse()
                .map_err(|_| self.bad(format!("invalid chunk index {index:?}")))?,
            data: data.clone(),
        })
    }

    fn expect_kind(&self, kind: MessageType) -> Result<(), WireError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(WireError::UnexpectedType {
                expected: kind,
                got: self.kind,
            })
        }
    }

    /// Items after the leading count. The count must match the number of items.
    fn counted_items(&self) -> Result<&[String], WireError> {
        let (count, items) = self
            .args
            .split_first()
            .ok_or_else(|| self.bad("missing item count".to_string()))?;
        let count: usize = count
            .parse()
            .map_err(|_| self.bad(format!("invalid item count {count:?}")))?;
        if count != items.len() {
            return Err(self.bad(format!("count {count} but {} items", items.len())));
        }
        Ok(items)
    }

    fn bad(&self, reason: String) -> WireError {
        WireError::BadArguments {
            kind: self.kind,
            reason,
        }
    }
}

fn counted(items: Vec<String>) -> Vec<String> {
    std::iter::once(items.len().to_string())
        .chain(items)
        .collect()
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.origin, self.clock, self.kind)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_entries_split_from_right() {
        let entries = vec![
            PeerEntry {
                address: "127.0.0.1:9001".into(),
                status: PeerStatus::Online,
                clock: 4,
            },
            PeerEntry {
                address: "localhost:9002".into(),
                status: PeerStatus::Offline,
                clock: 0,
            },
        ];
        let msg = Message::peers_list("127.0.0.1:9000", &entries);
        assert_eq!(msg.args[0], "2");
        assert_eq!(msg.args[1], "127.0.0.1:9001:ONLINE:4");
        assert_eq!(msg.peer_entries().unwrap(), entries);
    }

    #[test]
    fn empty_peers_list() {
        let msg = Message::peers_list("a:1", &[]);
        assert_eq!(msg.args, vec!["0".to_string()]);
        assert!(msg.peer_entries().unwrap().is_empty());
    }

    #[test]
    fn peer_entries_reject_count_mismatch() {
        let msg = Message::with_args(
            "a:1",
            MessageType::PeersList,
            vec!["2".into(), "b:2:ONLINE:1".into()],
        );
        assert!(matches!(
            msg.peer_entries(),
            Err(WireError::BadArguments { .. })
        ));
    }

    #[test]
    fn peer_entries_reject_bad_status() {
        let msg = Message::with_args(
            "a:1",
            MessageType::PeersList,
            vec!["1".into(), "b:2:SLEEPING:1".into()],
        );
        assert!(msg.peer_entries().is_err());
    }

    #[test]
    fn file_entries_allow_colon_in_name() {
        let files = vec![
            FileEntry {
                name: "notes:v2.txt".into(),
                size: 120,
            },
            FileEntry {
                name: "movie.mp4".into(),
                size: 4_000_000,
            },
        ];
        let msg = Message::ls_list("a:1", &files);
        assert_eq!(msg.file_entries().unwrap(), files);
    }

    #[test]
    fn chunk_request_roundtrip() {
        let req = ChunkRequest {
            file_name: "data.bin".into(),
            chunk_size: 300,
            index: 3,
        };
        let msg = Message::chunk_request("a:1", &req);
        assert_eq!(msg.kind, MessageType::Dl);
        assert_eq!(msg.args, vec!["data.bin", "300", "3"]);
        assert_eq!(msg.parse_chunk_request().unwrap(), req);
    }

    #[test]
    fn chunk_payload_bad_index() {
        let msg = Message::with_args(
            "a:1",
            MessageType::File,
            vec!["f".into(), "0".into(), "x".into(), "AAAA".into()],
        );
        assert!(matches!(
            msg.parse_chunk_payload(),
            Err(WireError::BadArguments {
                kind: MessageType::File,
                ..
            })
        ));
    }

    #[test]
    fn payload_accessor_checks_kind() {
        let msg = Message::new("a:1", MessageType::Hello);
        assert!(matches!(
            msg.parse_chunk_payload(),
            Err(WireError::UnexpectedType {
                expected: MessageType::File,
                got: MessageType::Hello
            })
        ));
    }

    #[test]
    fn display_matches_wire_fields() {
        let mut msg = Message::with_args(
            "a:1",
            MessageType::Dl,
            vec!["f".into(), "1".into(), "0".into()],
        );
        msg.clock = 7;
        assert_eq!(msg.to_string(), "a:1 7 DL f 1 0");
    }
}
