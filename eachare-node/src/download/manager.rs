use std::ops::Range;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use super::{attempt, AbandonedRange, Queues, TransferContext};

/// Issue every index of `range` to `origin`, in order, at most
/// `max_concurrent_per_manager` at a time.
///
/// The token is checked after each permit is acquired. Once it has fired, the
/// unissued rest of the range goes to the rebalance drain and the origin is
/// charged one failure. Attempts already in flight still run to completion.
pub(super) async fn run(
    ctx: Arc<TransferContext>,
    origin: String,
    range: Range<u64>,
    token: CancellationToken,
    queues: Queues,
    abandoned: UnboundedSender<AbandonedRange>,
) {
    debug!(origin = %origin, start = range.start, end = range.end, "manager started");
    let semaphore = Arc::new(Semaphore::new(
        ctx.node.settings().max_concurrent_per_manager.max(1),
    ));
    let mut in_flight = JoinSet::new();

    for index in range.clone() {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit.filter(|_| !token.is_cancelled()) else {
            info!(origin = %origin, start = index, end = range.end, "origin failed, range abandoned");
            ctx.healthy.mark_failed(&origin);
            let _ = abandoned.send(AbandonedRange {
                start: index,
                end: range.end,
                origin: origin.clone(),
            });
            break;
        };

        let ctx = ctx.clone();
        let origin = origin.clone();
        let token = token.clone();
        let queues = queues.clone();
        in_flight.spawn(
            async move {
                let outcome = attempt::request_chunk(&ctx, index, &origin, &token).await;
                queues.route(outcome);
                drop(permit);
            }
            .in_current_span(),
        );
    }

    while in_flight.join_next().await.is_some() {}
    debug!(origin = %origin, "manager finished");
}
