//! Parallel chunk download from every origin of a file.
//!
//! One manager per origin walks a contiguous range of chunk indices. Failed attempts
//! go to the retry drain; ranges a manager gives up on go to the rebalance drain.
//! Queues close in dependency order (managers, rebalance, retry, results) and the
//! caller assembles whatever reached the results queue.

mod attempt;
mod manager;
mod recovery;


use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eachare_core::chunk::total_chunks;
use eachare_core::{
    scheduler, AssemblyError, ChunkSlots, FileDescriptor, HealthyOrigins, StatKey,
    DEFAULT_CHUNK_SIZE, MAX_CHUNKS, MAX_CHUNK_SIZE,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::connection::NetError;
use crate::node::Node;
use crate::shared::{self, SharedDirError};

/// Why a download was abandoned. Per-chunk failures are retried and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("no origins for the file")]
    NoOrigins,
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("{chunks} chunks exceeds the limit of {limit}")]
    TooManyChunks { chunks: u64, limit: u64 },
    #[error("chunk size {size} exceeds the limit of {limit} bytes")]
    ChunkTooLarge { size: u64, limit: u64 },
    #[error("chunk {index} failed more than {limit} times, last from {origin}")]
    RetriesExhausted {
        index: u64,
        limit: u32,
        origin: String,
    },
    #[error("no healthy origin left for chunks {start}..{end} ({summary})")]
    NoHealthyOrigins { start: u64, end: u64, summary: String },
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<SharedDirError> for DownloadError {
    fn from(e: SharedDirError) -> Self {
        match e {
            SharedDirError::InvalidName(name) => DownloadError::InvalidName(name),
            SharedDirError::Io { path, source } => DownloadError::Write { path, source },
        }
    }
}

/// A chunk as returned by its origin. `payload` is still base64.
#[derive(Debug)]
pub struct ChunkResult {
    pub index: u64,
    pub payload: String,
    pub origin: String,
}

#[derive(Debug)]
pub struct ChunkFailure {
    pub index: u64,
    pub origin: String,
    pub error: NetError,
}

/// Indices `[start, end)` a manager stopped issuing after its origin failed.
#[derive(Debug)]
pub struct AbandonedRange {
    pub start: u64,
    pub end: u64,
    pub origin: String,
}

/// Finished download.
#[derive(Debug)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub chunks: u64,
    pub elapsed: Duration,
}

/// Read-only state shared by every task of one download.
#[derive(Debug)]
pub(crate) struct TransferContext {
    node: Arc<Node>,
    file_name: String,
    chunk_size: u64,
    healthy: HealthyOrigins,
}

impl TransferContext {
    fn new(node: Arc<Node>, file_name: &str, chunk_size: u64, origins: Vec<String>) -> Self {
        let max_failures = node.settings().max_failures_per_origin;
        Self {
            node,
            file_name: file_name.to_string(),
            chunk_size,
            healthy: HealthyOrigins::new(origins, max_failures),
        }
    }
}

/// Where attempt outcomes go. Held by managers and the rebalance drain; the retry
/// drain never holds a failure sender.
#[derive(Debug, Clone)]
struct Queues {
    results: UnboundedSender<ChunkResult>,
    failures: UnboundedSender<ChunkFailure>,
}

impl Queues {
    fn route(&self, outcome: Result<ChunkResult, ChunkFailure>) {
        match outcome {
            Ok(result) => {
                let _ = self.results.send(result);
            }
            Err(failure) => {
                let _ = self.failures.send(failure);
            }
        }
    }
}

/// Download `file` from its origins into the shared directory.
///
/// Nothing is written unless every chunk arrived and decoded. On success the elapsed
/// time is added to the node's statistics.
pub async fn download(
    node: &Arc<Node>,
    file: &FileDescriptor,
    chunk_size: u64,
) -> Result<DownloadReport, DownloadError> {
    let span = info_span!("download", transfer = %Uuid::new_v4(), file = %file.name);
    run(node.clone(), file, chunk_size).instrument(span).await
}

async fn run(
    node: Arc<Node>,
    file: &FileDescriptor,
    chunk_size: u64,
) -> Result<DownloadReport, DownloadError> {
    shared::resolve(node.shared_dir(), &file.name)?;
    let mut origins: Vec<String> = Vec::with_capacity(file.origins.len());
    for origin in &file.origins {
        if !origin.is_empty() && !origins.contains(origin) {
            origins.push(origin.clone());
        }
    }
    if origins.is_empty() {
        return Err(DownloadError::NoOrigins);
    }
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(DownloadError::ChunkTooLarge {
            size: chunk_size,
            limit: MAX_CHUNK_SIZE,
        });
    }
    // The size comes from a remote listing: bound it before allocating slots.
    let total = total_chunks(file.size, chunk_size);
    if total > MAX_CHUNKS {
        return Err(DownloadError::TooManyChunks {
            chunks: total,
            limit: MAX_CHUNKS,
        });
    }
    let started = Instant::now();
    info!(
        size = file.size,
        chunk_size,
        chunks = total,
        origins = origins.len(),
        "download started"
    );

    let ctx = Arc::new(TransferContext::new(
        node.clone(),
        &file.name,
        chunk_size,
        origins.clone(),
    ));
    let abort = CancellationToken::new();
    let (result_tx, mut result_rx) = mpsc::unbounded_channel();
    let (failure_tx, failure_rx) = mpsc::unbounded_channel();
    let (abandoned_tx, abandoned_rx) = mpsc::unbounded_channel();
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let queues = Queues {
        results: result_tx,
        failures: failure_tx,
    };

    let mut managers = JoinSet::new();
    for (origin, range) in scheduler::assign_ranges(total, &origins) {
        managers.spawn(
            manager::run(
                ctx.clone(),
                origin.to_string(),
                range,
                abort.child_token(),
                queues.clone(),
                abandoned_tx.clone(),
            )
            .in_current_span(),
        );
    }
    let rebalance = tokio::spawn(
        recovery::rebalance(ctx.clone(), abandoned_rx, queues.clone(), fatal_tx.clone())
            .in_current_span(),
    );
    let retry = tokio::spawn(
        recovery::retry(ctx.clone(), failure_rx, queues.results.clone(), fatal_tx)
            .in_current_span(),
    );
    let drains = [rebalance.abort_handle(), retry.abort_handle()];
    let supervisor = tokio::spawn(
        close_in_order(managers, abandoned_tx, rebalance, queues, retry).in_current_span(),
    );

    let mut slots = ChunkSlots::new(total);
    let fatal = tokio::select! {
        biased;
        Some(err) = fatal_rx.recv() => Some(err),
        _ = collect(&mut result_rx, &mut slots) => None,
    };
    // A drain may report and exit just before the results queue closes.
    if let Some(e) = fatal.or_else(|| fatal_rx.try_recv().ok()) {
        abort.cancel();
        supervisor.abort();
        for handle in drains {
            handle.abort();
        }
        error!(error = %e, "download failed");
        return Err(e);
    }

    info!(received = slots.filled(), chunks = total, "all queues closed");
    if let Some(index) = slots.first_missing() {
        error!(chunk = index, received = slots.filled(), chunks = total, "chunk never arrived");
    }
    let bytes = slots.assemble().map_err(|e| {
        error!(error = %e, "download failed");
        DownloadError::from(e)
    })?;
    if bytes.len() as u64 != file.size {
        warn!(expected = file.size, got = bytes.len(), "assembled size differs from advertised size");
    }
    let path = shared::write_file(node.shared_dir(), &file.name, &bytes).await?;
    let elapsed = started.elapsed();
    node.record_transfer(
        StatKey {
            chunk_size,
            origin_count: origins.len(),
            file_size: file.size,
        },
        elapsed,
    );
    info!(path = %path.display(), elapsed_ms = elapsed.as_millis() as u64, "download finished");
    Ok(DownloadReport {
        path,
        chunks: total,
        elapsed,
    })
}

/// Move results into their slots until the results queue closes.
async fn collect(results: &mut UnboundedReceiver<ChunkResult>, slots: &mut ChunkSlots) {
    while let Some(result) = results.recv().await {
        if !slots.insert(result.index, result.payload) {
            warn!(chunk = result.index, origin = %result.origin, "result for unknown chunk dropped");
        }
    }
}

/// Close the queues in dependency order: every sender of a queue is gone before the
/// drain reading it can finish.
async fn close_in_order(
    mut managers: JoinSet<()>,
    abandoned: UnboundedSender<AbandonedRange>,
    rebalance: JoinHandle<()>,
    queues: Queues,
    retry: JoinHandle<()>,
) {
    while let Some(joined) = managers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "manager task failed");
        }
    }
    drop(abandoned);

    if let Err(e) = rebalance.await {
        warn!(error = %e, "rebalance task failed");
    }
    let Queues { results, failures } = queues;
    drop(failures);

    if let Err(e) = retry.await {
        warn!(error = %e, "retry task failed");
    }
    drop(results);
}
