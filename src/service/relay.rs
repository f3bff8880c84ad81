//! Relays upstream fragments to the caller as envelopes.
//!
//! Output on normal completion: `token*`, `meta`, `[DONE]`.
//! Output on upstream failure: `token*`, `error`, then the stream ends.

use std::pin::Pin;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::agent::FragmentStream;
use crate::models::{Envelope, RelayFrame, StreamSummary};
use crate::service::transcript::TranscriptReconciler;

pub type RelayStream = Pin<Box<dyn Stream<Item = RelayFrame> + Send>>;

/// Where the assembled reply goes once the stream completes.
pub struct PendingReply {
    pub reconciler: TranscriptReconciler,
    pub owner_id: String,
    pub session_id: String,
}

impl PendingReply {
    async fn commit(self, reply: String) {
        match self
            .reconciler
            .complete(&self.owner_id, &self.session_id, &reply)
            .await
        {
            Ok(true) => debug!(session_id = %self.session_id, "assistant reply stored"),
            Ok(false) => {}
            Err(e) => error!(session_id = %self.session_id, "Failed to store assistant reply: {e}"),
        }
    }
}

/// Consumes `fragments` exactly once. Token count is one per fragment.
pub fn relay(
    mut fragments: FragmentStream,
    started: Instant,
    pending: Option<PendingReply>,
) -> RelayStream {
    Box::pin(async_stream::stream! {
        let mut reply = String::new();
        let mut token_count: u64 = 0;

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    token_count += 1;
                    reply.push_str(&fragment);
                    yield RelayFrame::Envelope(Envelope::Token(fragment));
                }
                Err(e) => {
                    warn!(token_count, "upstream failed mid-stream: {e}");
                    yield RelayFrame::Envelope(Envelope::Error(e.to_string()));
                    return;
                }
            }
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Some(pending) = pending {
            pending.commit(reply).await;
        }
        info!(token_count, elapsed_ms, "stream completed");

        yield RelayFrame::Envelope(Envelope::Meta(StreamSummary { token_count, elapsed_ms }));
        yield RelayFrame::Done;
    })
}
