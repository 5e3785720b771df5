//! EACHare protocol core.
//! No I/O: the node binary owns sockets and files and calls into these types.

pub mod catalog;
pub mod chunk;
pub mod clock;
pub mod health;
pub mod peers;
pub mod protocol;
pub mod scheduler;
pub mod stats;
pub mod wire;

pub use catalog::{FileCatalog, FileDescriptor};
pub use chunk::{AssemblyError, ChunkSlots, DEFAULT_CHUNK_SIZE, MAX_CHUNKS, MAX_CHUNK_SIZE};
pub use clock::LogicalClock;
pub use health::HealthyOrigins;
pub use peers::{Peer, PeerRegistry, PeerStatus};
pub use protocol::{ChunkPayload, ChunkRequest, FileEntry, Message, MessageType, PeerEntry};
pub use stats::{StatKey, TransferStatistic, TransferStats};
pub use wire::{decode, encode, WireError};
