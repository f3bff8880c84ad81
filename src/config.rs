use std::env;

use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// `base_url` overrides the public Gemini endpoint.
    Gemini { api_key: String, base_url: Option<String> },
    Ollama { base_url: String },
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub provider: LlmProvider,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let port = get("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let database_url = get("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let max_connections = get("DATABASE_MAX_CONNECTIONS")
            .and_then(|n| n.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let provider = match get("LLM_PROVIDER")
            .unwrap_or_else(|| "gemini".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => LlmProvider::Gemini {
                api_key: get("GEMINI_API_KEY")
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| AppError::EmptyField { field_name: "GEMINI_API_KEY".into() })?,
                base_url: get("GEMINI_API_BASE_URL").filter(|url| !url.trim().is_empty()),
            },
            "ollama" => LlmProvider::Ollama {
                base_url: get("OLLAMA_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            },
            other => {
                return Err(AppError::InvalidRequest(format!("unknown LLM_PROVIDER '{other}'")));
            }
        };

        Ok(Self { port, database_url, max_connections, provider })
    }
}
