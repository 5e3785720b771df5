use eachare_core::{ChunkRequest, Message, MessageType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ChunkFailure, ChunkResult, TransferContext};
use crate::connection::{self, NetError};

/// Fetch one chunk from `origin`. Any failure fires `token` so the owning manager
/// stops issuing to that origin.
pub(super) async fn request_chunk(
    ctx: &TransferContext,
    index: u64,
    origin: &str,
    token: &CancellationToken,
) -> Result<ChunkResult, ChunkFailure> {
    match fetch(ctx, index, origin).await {
        Ok(payload) => {
            debug!(chunk = index, origin = %origin, "chunk received");
            Ok(ChunkResult {
                index,
                payload,
                origin: origin.to_string(),
            })
        }
        Err(error) => {
            warn!(chunk = index, origin = %origin, error = %error, "chunk request failed");
            token.cancel();
            Err(ChunkFailure {
                index,
                origin: origin.to_string(),
                error,
            })
        }
    }
}

async fn fetch(ctx: &TransferContext, index: u64, origin: &str) -> Result<String, NetError> {
    let request = ChunkRequest {
        file_name: ctx.file_name.clone(),
        chunk_size: ctx.chunk_size,
        index,
    };
    let message = Message::chunk_request(ctx.node.address(), &request);
    let reply = connection::request(
        &ctx.node,
        origin,
        message,
        ctx.node.settings().request_timeout,
    )
    .await?;
    if reply.kind != MessageType::File {
        return Err(NetError::UnexpectedReply(reply.kind));
    }
    let payload = reply.parse_chunk_payload()?;
    if payload.index != index {
        return Err(NetError::ChunkMismatch {
            expected: index,
            got: payload.index,
        });
    }
    Ok(payload.data)
}
