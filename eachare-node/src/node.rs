//! Process-wide node state handed to every task as `Arc<Node>`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use eachare_core::{LogicalClock, PeerRegistry, StatKey, TransferStats, DEFAULT_CHUNK_SIZE};

/// Download and messaging limits.
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_concurrent_per_manager: usize,
    pub max_failures_per_origin: u32,
    pub max_retries_per_chunk: u32,
    pub request_timeout: Duration,
    pub gossip_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        crate::config::Config::default().settings()
    }
}

/// This node: own address, shared directory, clock, peer table and statistics.
#[derive(Debug)]
pub struct Node {
    address: String,
    shared_dir: PathBuf,
    clock: LogicalClock,
    peers: PeerRegistry,
    settings: Settings,
    chunk_size: AtomicU64,
    stats: Mutex<TransferStats>,
}

impl Node {
    pub fn new(address: impl Into<String>, shared_dir: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            address: address.into(),
            shared_dir: shared_dir.into(),
            clock: LogicalClock::new(),
            peers: PeerRegistry::new(),
            settings,
            chunk_size: AtomicU64::new(DEFAULT_CHUNK_SIZE),
            stats: Mutex::new(TransferStats::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size.load(Ordering::Relaxed)
    }

    /// Set the chunk size used by later downloads. Zero is ignored.
    pub fn set_chunk_size(&self, size: u64) {
        if size > 0 {
            self.chunk_size.store(size, Ordering::Relaxed);
        }
    }

    pub fn record_transfer(&self, key: StatKey, elapsed: Duration) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(key, elapsed);
    }

    /// Copy of the statistics accumulator.
    pub fn stats(&self) -> TransferStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
