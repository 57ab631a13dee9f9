//! Helpers for draining a [`CompletionStream`].

use crate::error::{LlmError, Result};
use crate::service::CompletionStream;
use crate::types::TokenUsage;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Concatenate every chunk of `stream`.
///
/// Stops at the first `done` chunk, at the first error, or when `cancel`
/// fires. Returns the collected text and the last usage reported.
pub async fn collect_stream(
    mut stream: CompletionStream,
    cancel: &CancellationToken,
) -> Result<(String, Option<TokenUsage>)> {
    let mut content = String::new();
    let mut usage = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            next = stream.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        content.push_str(&chunk.content);
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if chunk.done {
            break;
        }
    }

    Ok((content, usage))
}

/// Write every chunk of `stream` to `writer` as it arrives.
///
/// Same termination rules as [`collect_stream`]. The writer is flushed
/// before returning successfully.
pub async fn stream_to_writer<W>(
    mut stream: CompletionStream,
    cancel: &CancellationToken,
    writer: &mut W,
) -> Result<Option<TokenUsage>>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut usage = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            next = stream.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        if !chunk.content.is_empty() {
            writer
                .write_all(chunk.content.as_bytes())
                .await
                .map_err(|e| LlmError::Other(format!("stream write failed: {}", e)))?;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if chunk.done {
            break;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| LlmError::Other(format!("stream flush failed: {}", e)))?;
    Ok(usage)
}
