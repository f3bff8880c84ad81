use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Label used when flattening a transcript into a single prompt.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "USER",
            MessageRole::Assistant => "ASSISTANT",
            MessageRole::System => "SYSTEM",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Sampling parameters supplied with every chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Durable, owner-scoped transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: String,
    pub owner_id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(
        session_id: String,
        owner_id: String,
        title: String,
        messages: Vec<ChatMessage>,
        config: &GenerationConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            owner_id,
            title,
            messages,
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            owner_id: self.owner_id.clone(),
            title: self.title.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            message_count: self.messages.len() as i64,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Applies a partial update in place, the same way the stores do.
    pub fn apply(&mut self, update: &SessionUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(messages) = &update.messages {
            self.messages = messages.clone();
        }
        if let Some(model) = &update.model {
            self.model = model.clone();
        }
        if let Some(t) = update.temperature {
            self.temperature = t;
        }
        if let Some(p) = update.top_p {
            self.top_p = p;
        }
        if let Some(m) = update.max_tokens {
            self.max_tokens = m;
        }
        self.updated_at = update.updated_at;
    }
}

/// Session metadata without the transcript, as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub owner_id: String,
    pub title: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: Option<u32>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field overwrite applied by `SessionStore::update` and `append_messages`.
/// `None` leaves the stored field untouched; `updated_at` is always written.
/// `max_tokens` is nullable in storage, so `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<Option<u32>>,
    pub updated_at: DateTime<Utc>,
}

impl SessionUpdate {
    pub fn touch() -> Self {
        Self {
            title: None,
            messages: None,
            model: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_config(config: &GenerationConfig) -> Self {
        Self {
            model: Some(config.model.clone()),
            temperature: Some(config.temperature),
            top_p: Some(config.top_p),
            max_tokens: Some(config.max_tokens),
            ..Self::touch()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub title_contains: Option<String>,
    pub skip: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub items: Vec<SessionSummary>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

// ── Relay wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub token_count: u64,
    pub elapsed_ms: u64,
}

/// One line of relay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Envelope {
    Token(String),
    Meta(StreamSummary),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Envelope(Envelope),
    Done,
}

impl RelayFrame {
    pub const SENTINEL: &'static str = "[DONE]";

    /// Payload written after `data: ` on the event stream.
    pub fn payload(&self) -> String {
        match self {
            RelayFrame::Envelope(envelope) => serde_json::to_string(envelope)
                .unwrap_or_else(|e| Self::error_payload(&e.to_string())),
            RelayFrame::Done => Self::SENTINEL.to_string(),
        }
    }

    fn error_payload(message: &str) -> String {
        serde_json::json!({ "type": "error", "data": message }).to_string()
    }
}

// ── Request bodies ────────────────────────────────────────────────────────────

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_top_p() -> f64 {
    DEFAULT_TOP_P
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub id: String,
    pub title: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListQuery {
    pub q: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionIdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
}
