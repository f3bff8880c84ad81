use std::fmt::Display;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::future::ready;
use futures_util::{stream, Stream, StreamExt};
use rig::client::Nothing;
use rig::completion::CompletionModel;
use rig::prelude::CompletionClient;
use rig::providers::{gemini, ollama};
use rig::streaming::StreamedAssistantContent;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::LlmProvider;
use crate::errors::AppError;
use crate::models::{ChatMessage, GenerationConfig};

/// Incremental text fragments produced by the upstream model.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(messages: &[ChatMessage], config: &GenerationConfig) -> Self {
        Self {
            prompt: build_prompt(messages),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_tokens,
        }
    }
}

/// Upstream text-generation service.
///
/// `generate` resolves once the upstream has produced its first fragment;
/// failures before that point are returned as `Err`, failures afterwards
/// arrive as `Err` items on the stream.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream, AppError>;
}

/// Flattens a transcript into one prompt, one `ROLE: content` line per message.
pub fn build_prompt(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

const DEFAULT_GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
const REDACTED: &str = "[redacted]";

#[derive(Clone)]
enum Backend {
    Gemini { client: gemini::Client, api_key: String, host: String },
    Ollama { client: ollama::Client, base_url: String },
}

/// [`TextGenerator`] backed by a rig provider client.
/// The client is built once at startup and shared by every request;
/// a completion model handle is created per request for the requested model id.
#[derive(Clone)]
pub struct RigGenerator {
    backend: Backend,
}

impl RigGenerator {
    pub fn new(provider: &LlmProvider) -> Result<Self, AppError> {
        let backend = match provider {
            LlmProvider::Gemini { api_key, base_url } => {
                let mut builder = gemini::Client::builder().api_key(api_key.clone());
                if let Some(url) = base_url {
                    builder = builder.base_url(url);
                }
                let client = builder
                    .build()
                    .map_err(|e| AppError::Unexpected(format!("Failed to build Gemini client: {e}")))?;
                Backend::Gemini {
                    client,
                    api_key: api_key.clone(),
                    host: base_url.clone().unwrap_or_else(|| DEFAULT_GEMINI_HOST.to_string()),
                }
            }
            LlmProvider::Ollama { base_url } => {
                let client = ollama::Client::builder()
                    .api_key(Nothing)
                    .base_url(base_url)
                    .build()
                    .map_err(|e| AppError::Unexpected(format!("Failed to build Ollama client: {e}")))?;
                Backend::Ollama { client, base_url: base_url.clone() }
            }
        };
        Ok(Self { backend })
    }
}

#[async_trait]
impl TextGenerator for RigGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream, AppError> {
        debug!(model = %request.model, prompt_len = request.prompt.len(), "starting upstream stream");
        match &self.backend {
            Backend::Gemini { client, api_key, host } => {
                let model = client.completion_model(&request.model);
                stream_text(model, &request, gemini_params(&request), Some(api_key.as_str()))
                    .await
                    .map_err(|e| {
                        error!("Gemini stream failed to start for model {}: {e}", request.model);
                        unavailable_on_connect(e, host)
                    })
            }
            Backend::Ollama { client, base_url } => {
                let model = client.completion_model(&request.model);
                stream_text(model, &request, ollama_params(&request), None)
                    .await
                    .map_err(|e| {
                        error!("Ollama stream failed to start for model {}: {e}", request.model);
                        unavailable_on_connect(e, base_url)
                    })
            }
        }
    }
}

fn gemini_params(request: &GenerationRequest) -> Value {
    json!({ "generationConfig": { "topP": request.top_p } })
}

/// rig merges these into the Ollama `options` object next to `temperature`.
fn ollama_params(request: &GenerationRequest) -> Value {
    let mut params = json!({ "top_p": request.top_p });
    if let Some(n) = request.max_output_tokens {
        params["num_predict"] = json!(n);
    }
    params
}

fn unavailable_on_connect(error: AppError, host: &str) -> AppError {
    match error {
        AppError::Upstream { message }
            if message.contains("Connection refused") || message.contains("connect") =>
        {
            AppError::UpstreamUnavailable { host: host.to_string() }
        }
        other => other,
    }
}

/// Masks credentials in provider error text. Gemini puts the API key in the
/// request URL, which reqwest echoes back in its error messages.
fn redact_secrets(message: &str, secret: Option<&str>) -> String {
    let mut redacted = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(pos) = rest.find("key=") {
        let (head, tail) = rest.split_at(pos + "key=".len());
        redacted.push_str(head);
        redacted.push_str(REDACTED);
        let end = tail
            .find(|c: char| c == '&' || c == ')' || c == '"' || c == '\'' || c.is_whitespace())
            .unwrap_or(tail.len());
        rest = &tail[end..];
    }
    redacted.push_str(rest);
    match secret.filter(|s| !s.is_empty()) {
        Some(secret) => redacted.replace(secret, REDACTED),
        None => redacted,
    }
}

fn upstream_error(error: impl Display, secret: Option<&str>) -> AppError {
    AppError::upstream(redact_secrets(&error.to_string(), secret))
}

/// Waits for the first fragment so that connection and request failures
/// surface from `generate` instead of as the first stream item.
async fn first_fragment(mut fragments: FragmentStream) -> Result<FragmentStream, AppError> {
    match fragments.next().await {
        Some(Err(e)) => Err(e),
        Some(Ok(first)) => Ok(Box::pin(stream::once(ready(Ok(first))).chain(fragments))),
        None => Ok(Box::pin(stream::empty())),
    }
}

/// Opens a rig completion stream and keeps only its text deltas.
async fn stream_text<M>(
    model: M,
    request: &GenerationRequest,
    params: Value,
    secret: Option<&str>,
) -> Result<FragmentStream, AppError>
where
    M: CompletionModel + Send + Sync + 'static,
    M::StreamingResponse: Send + 'static,
{
    let mut builder = model
        .completion_request(request.prompt.clone())
        .temperature(request.temperature)
        .additional_params(params);
    if let Some(n) = request.max_output_tokens {
        builder = builder.max_tokens(u64::from(n));
    }

    let response = builder
        .stream()
        .await
        .map_err(|e| upstream_error(e, secret))?;

    let secret = secret.map(str::to_owned);
    let fragments = response.filter_map(move |item| {
        ready(match item {
            Ok(StreamedAssistantContent::Text(text)) => Some(Ok(text.text)),
            Ok(_) => None,
            Err(e) => Some(Err(upstream_error(e, secret.as_deref()))),
        })
    });
    first_fragment(Box::pin(fragments)).await
}
