use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::agent::{GenerationRequest, TextGenerator};
use crate::errors::AppError;
use crate::models::{ChatStreamRequest, GenerationConfig};
use crate::service::relay::{relay, PendingReply, RelayStream};
use crate::service::transcript::TranscriptReconciler;

#[derive(Clone)]
pub struct ChatService {
    generator: Arc<dyn TextGenerator>,
    transcripts: TranscriptReconciler,
}

impl ChatService {
    pub fn new(generator: Arc<dyn TextGenerator>, transcripts: TranscriptReconciler) -> Self {
        Self { generator, transcripts }
    }

    /// Validates the turn, runs the transcript pre-step and opens the upstream stream.
    ///
    /// Returns an error only before any output exists; once the stream is
    /// returned, upstream failures arrive in-band as an `error` envelope.
    pub async fn open_stream(
        &self,
        owner_id: Option<&str>,
        request: ChatStreamRequest,
    ) -> Result<RelayStream, AppError> {
        // ── Validation ────────────────────────────────────────────────────────
        if request.messages.is_empty() {
            return Err(AppError::EmptyField { field_name: "messages".to_string() });
        }
        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| AppError::EmptyField { field_name: "model".to_string() })?;

        let config = GenerationConfig {
            model: model.to_string(),
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
        };

        // ── Transcript pre-step (authenticated callers with a session id) ───
        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let pending = match (owner_id, session_id) {
            (Some(owner_id), Some(session_id)) => {
                if let Err(e) = self
                    .transcripts
                    .prepare(owner_id, session_id, &request.messages, &config, request.title.as_deref())
                    .await
                {
                    error!(session_id, "Failed to persist user message: {e}");
                }
                Some(PendingReply {
                    reconciler: self.transcripts.clone(),
                    owner_id: owner_id.to_string(),
                    session_id: session_id.to_string(),
                })
            }
            _ => None,
        };

        // ── Upstream call ─────────────────────────────────────────────────────
        let started = Instant::now();
        let fragments = self
            .generator
            .generate(GenerationRequest::new(&request.messages, &config))
            .await
            .map_err(|e| {
                error!(model = %config.model, "Upstream call failed before streaming: {e}");
                e
            })?;
        info!(model = %config.model, persisted = pending.is_some(), "relaying upstream stream");

        Ok(relay(fragments, started, pending))
    }
}
