//! Deferred-output streaming discipline (spec.md §4.D, DESIGN NOTES §9).
//!
//! Buffers the first `n` chunks of a provider stream before exposing
//! anything to the caller. If the stream ends prematurely or errors before
//! any chunk is produced, the attempt is treated as failed and the buffer is
//! discarded — no partial tokens ever leak into a subsequent retry's output.

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::providers::base::ChatChunk;
use crate::providers::error_taxonomy::{ErrorCode, ProviderError};

pub struct DeferredStream {
    buffered: Vec<String>,
    rest: BoxStream<'static, ChatChunk>,
}

impl DeferredStream {
    /// Consume up to `n` chunks from `raw` before returning. Returns an error
    /// (instead of a stream) if the stream ends or errors before producing
    /// at least one chunk — the caller's retry/failover loop takes over.
    pub async fn buffer(
        mut raw: BoxStream<'static, ChatChunk>,
        n: usize,
    ) -> Result<Self, ProviderError> {
        let mut buffered = Vec::with_capacity(n.max(1));
        for _ in 0..n.max(1) {
            match raw.next().await {
                Some(Ok(chunk)) => buffered.push(chunk),
                Some(Err(e)) => {
                    if buffered.is_empty() {
                        return Err(e);
                    }
                    // A later-buffered chunk errored: still fail if we have
                    // not committed to emitting anything yet.
                    return Err(e);
                }
                None => {
                    if buffered.is_empty() {
                        return Err(ProviderError::new(
                            ErrorCode::ProviderUnavailable,
                            "stream ended before any chunk was produced",
                        ));
                    }
                    break;
                }
            }
        }
        if buffered.is_empty() {
            return Err(ProviderError::new(
                ErrorCode::ProviderUnavailable,
                "stream produced no chunks",
            ));
        }
        Ok(Self { buffered, rest: raw })
    }

    /// Flush the confirmed buffer, then proxy the remainder of the stream.
    /// Errors in the remainder are dropped from the text stream (the caller
    /// has already committed to this attempt's output by this point —
    /// mid-stream failures after the first confirmed chunk are surfaced as a
    /// truncated response, not retried, per the no-duplication invariant).
    pub fn into_stream(self) -> BoxStream<'static, String> {
        let prefix = stream::iter(self.buffered);
        let suffix = self.rest.filter_map(|c| async move { c.ok() });
        Box::pin(prefix.chain(suffix))
    }
}
