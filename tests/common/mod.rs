#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::stream;
use serde_json::Value;
use tower::util::ServiceExt;

use streamchat::agent::{FragmentStream, GenerationRequest, TextGenerator};
use streamchat::db::memory::MemoryStore;
use streamchat::errors::AppError;
use streamchat::routes::create_router;
use streamchat::state::AppState;

/// Replays a fixed script of fragments and records every request it receives.
pub struct ScriptedGenerator {
    script: Vec<Result<String, String>>,
    refuse: bool,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn replying(fragments: &[&str]) -> Self {
        Self {
            script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            refuse: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(fragments: &[&str], message: &str) -> Self {
        let mut generator = Self::replying(fragments);
        generator.script.push(Err(message.to_string()));
        generator
    }

    pub fn unavailable() -> Self {
        Self { refuse: true, ..Self::replying(&[]) }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<FragmentStream, AppError> {
        self.requests.lock().unwrap().push(request);
        if self.refuse {
            return Err(AppError::UpstreamUnavailable { host: "test-upstream".into() });
        }
        let items: Vec<Result<String, AppError>> = self
            .script
            .iter()
            .cloned()
            .map(|item| item.map_err(AppError::upstream))
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
}

impl TestApp {
    pub fn new(generator: ScriptedGenerator) -> Self {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(generator);
        let state = AppState::new(generator.clone(), store.clone(), store.clone());
        Self { router: create_router(state), store, generator }
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn register_and_login(&self, email: &str, password: &str) -> String {
        let creds = serde_json::json!({ "email": email, "password": password });
        let (status, _) = self.send("POST", "/api/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = self.send("POST", "/api/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        let login: Value = serde_json::from_str(&body).unwrap();
        login["token"].as_str().unwrap().to_string()
    }
}

/// Payloads of every `data: ` line in an event-stream body.
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}
