//! Drives one model stream until it ends or an action block closes.

use clinicdesk_core::error::ProviderError;
use clinicdesk_core::provider::{ChunkReceiver, Provider, ProviderRequest, Usage};
use tracing::debug;

use crate::parser::BlockScanner;

/// What one stream produced.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Accumulated text, through the delta that closed the first block.
    pub text: String,
    /// The stream was cut short because a block closed.
    pub stopped_for_block: bool,
    /// Items taken off the stream, including the one that closed the block.
    pub chunks_read: usize,
    pub usage: Option<Usage>,
}

/// Open a stream for `request` and consume it.
///
/// `on_delta` fires after every text delta with the text so far and the
/// action name of a block still being written, if one can be read yet.
pub async fn stream_until_block<F>(
    provider: &dyn Provider,
    request: ProviderRequest,
    on_delta: F,
) -> Result<StreamOutcome, ProviderError>
where
    F: FnMut(&str, Option<&str>),
{
    let rx = provider.stream(request).await?;
    consume(rx, on_delta).await
}

/// Read `rx` until the first block closes, the stream ends, or it fails.
///
/// On block close the receiver is dropped, which tears down the transport.
/// A cancellation reported by the provider resolves with the text so far;
/// any other error is returned.
pub async fn consume<F>(mut rx: ChunkReceiver, mut on_delta: F) -> Result<StreamOutcome, ProviderError>
where
    F: FnMut(&str, Option<&str>),
{
    let mut scanner = BlockScanner::new();
    let mut chunks_read = 0;
    let mut usage = None;

    while let Some(item) = rx.recv().await {
        chunks_read += 1;
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) if e.is_cancellation() => {
                debug!(chunks_read, "Stream cancelled, keeping accumulated text");
                break;
            }
            Err(e) => return Err(e),
        };

        if chunk.usage.is_some() {
            usage = chunk.usage;
        }

        if let Some(delta) = chunk.content.as_deref().filter(|d| !d.is_empty()) {
            scanner.push(delta);

            if scanner.first_close_end().is_some() {
                on_delta(scanner.text(), None);
                drop(rx);
                debug!(chunks_read, "Action block closed, stream cancelled");
                return Ok(StreamOutcome {
                    text: scanner.into_text(),
                    stopped_for_block: true,
                    chunks_read,
                    usage,
                });
            }

            on_delta(scanner.text(), scanner.pending_action_name());
        }

        if chunk.done {
            break;
        }
    }

    Ok(StreamOutcome {
        text: scanner.into_text(),
        stopped_for_block: false,
        chunks_read,
        usage,
    })
}
