//! The two drains: retry of single failed chunks, and redistribution of abandoned ranges.

use std::collections::HashMap;
use std::sync::Arc;

use eachare_core::scheduler;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::{attempt, AbandonedRange, ChunkFailure, ChunkResult, DownloadError, Queues, TransferContext};

/// Drain the failure queue. Each failure is charged to its origin and its chunk,
/// then retried on a random healthy origin. With none left, the failure waits out
/// the back-off and is handled again.
///
/// Retry attempts and back-offs live in this task's own join set, so nothing here
/// writes to the failure queue. Exits once the queue is closed and the set is empty,
/// or after reporting a fatal error.
pub(super) async fn retry(
    ctx: Arc<TransferContext>,
    mut failures: UnboundedReceiver<ChunkFailure>,
    results: UnboundedSender<ChunkResult>,
    fatal: UnboundedSender<DownloadError>,
) {
    let mut counts: HashMap<u64, u32> = HashMap::new();
    let mut pending: JoinSet<Result<ChunkResult, ChunkFailure>> = JoinSet::new();
    let mut queue_open = true;

    loop {
        let failure = tokio::select! {
            Some(joined) = pending.join_next(), if !pending.is_empty() => match joined {
                Ok(Ok(result)) => {
                    let _ = results.send(result);
                    continue;
                }
                Ok(Err(failure)) => failure,
                Err(e) => {
                    warn!(error = %e, "retry attempt failed to run");
                    continue;
                }
            },
            received = failures.recv(), if queue_open => match received {
                Some(failure) => failure,
                None => {
                    queue_open = false;
                    continue;
                }
            },
            else => break,
        };

        if let Err(e) = schedule(&ctx, &mut counts, &mut pending, failure) {
            error!(error = %e, "giving up on chunk");
            let _ = fatal.send(e);
            return;
        }
    }
    debug!("retry drain finished");
}

fn schedule(
    ctx: &Arc<TransferContext>,
    counts: &mut HashMap<u64, u32>,
    pending: &mut JoinSet<Result<ChunkResult, ChunkFailure>>,
    failure: ChunkFailure,
) -> Result<(), DownloadError> {
    if ctx.healthy.mark_failed(&failure.origin) {
        info!(origin = %failure.origin, last_error = %failure.error, "origin evicted");
    }
    let limit = ctx.node.settings().max_retries_per_chunk;
    let count = counts.entry(failure.index).or_insert(0);
    *count += 1;
    if *count > limit {
        return Err(DownloadError::RetriesExhausted {
            index: failure.index,
            limit,
            origin: failure.origin,
        });
    }

    let index = failure.index;
    match ctx.healthy.pick() {
        Some(origin) => {
            debug!(chunk = index, origin = %origin, attempt = *count, "retrying chunk");
            let ctx = ctx.clone();
            pending.spawn(
                async move {
                    let token = CancellationToken::new();
                    attempt::request_chunk(&ctx, index, &origin, &token).await
                }
                .in_current_span(),
            );
        }
        None => {
            let backoff = ctx.node.settings().retry_backoff;
            debug!(chunk = index, backoff_ms = backoff.as_millis() as u64, "no healthy origin, backing off");
            pending.spawn(
                async move {
                    tokio::time::sleep(backoff).await;
                    Err(failure)
                }
                .in_current_span(),
            );
        }
    }
    Ok(())
}

/// Drain the abandoned-range queue, spreading each range round-robin over the origins
/// still healthy at that moment. An empty healthy set is fatal.
pub(super) async fn rebalance(
    ctx: Arc<TransferContext>,
    mut abandoned: UnboundedReceiver<AbandonedRange>,
    queues: Queues,
    fatal: UnboundedSender<DownloadError>,
) {
    let semaphore = Arc::new(Semaphore::new(
        ctx.node.settings().max_concurrent_per_manager.max(1),
    ));
    let mut attempts = JoinSet::new();

    while let Some(range) = abandoned.recv().await {
        if range.start >= range.end {
            continue;
        }
        let healthy = ctx.healthy.snapshot();
        if healthy.is_empty() {
            let e = DownloadError::NoHealthyOrigins {
                start: range.start,
                end: range.end,
                summary: ctx.healthy.summary(),
            };
            error!(error = %e, "cannot rebalance");
            let _ = fatal.send(e);
            return;
        }
        info!(
            from = %range.origin,
            start = range.start,
            end = range.end,
            origins = healthy.len(),
            "rebalancing range"
        );
        for (index, origin) in scheduler::round_robin(range.start..range.end, &healthy) {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                return;
            };
            let ctx = ctx.clone();
            let origin = origin.to_string();
            let queues = queues.clone();
            attempts.spawn(
                async move {
                    let token = CancellationToken::new();
                    let outcome = attempt::request_chunk(&ctx, index, &origin, &token).await;
                    queues.route(outcome);
                    drop(permit);
                }
                .in_current_span(),
            );
        }
    }

    while attempts.join_next().await.is_some() {}
    debug!("rebalance drain finished");
}
