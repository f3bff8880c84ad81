use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::SessionStore;
use crate::errors::AppError;
use crate::models::{
    ChatSession, CreateSessionRequest, GenerationConfig, SessionListQuery, SessionPage,
    SessionQuery, SessionUpdate, UpdateSessionRequest,
};
use crate::service::transcript::derive_title;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MIN_PAGE_SIZE: u64 = 5;
pub const MAX_PAGE_SIZE: u64 = 50;

/// Owner-scoped session management behind the `/api/sessions` endpoints.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, owner_id: &str, query: SessionListQuery) -> Result<SessionPage, AppError> {
        let page_size = query
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        let title_contains = query
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let (items, total) = self
            .store
            .list(
                owner_id,
                &SessionQuery {
                    title_contains,
                    skip: (page - 1).saturating_mul(page_size),
                    limit: page_size,
                },
            )
            .await?;
        Ok(SessionPage { items, total, page, page_size })
    }

    pub async fn get(&self, owner_id: &str, session_id: &str) -> Result<ChatSession, AppError> {
        self.store
            .find(owner_id, session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound { id: session_id.to_string() })
    }

    pub async fn create(
        &self,
        owner_id: &str,
        request: CreateSessionRequest,
    ) -> Result<ChatSession, AppError> {
        if request.model.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "model".to_string() });
        }
        let session_id = request
            .session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| derive_title(&request.messages));
        let config = GenerationConfig {
            model: request.model,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
        };

        let session = ChatSession::new(
            session_id,
            owner_id.to_string(),
            title,
            request.messages,
            &config,
        );
        self.store.insert(&session).await?;
        info!(session_id = %session.session_id, "session created");
        Ok(session)
    }

    pub async fn update(
        &self,
        owner_id: &str,
        request: UpdateSessionRequest,
    ) -> Result<ChatSession, AppError> {
        if request.id.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "id".to_string() });
        }
        let update = SessionUpdate {
            title: request.title,
            messages: request.messages,
            model: request.model,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens.map(Some),
            updated_at: Utc::now(),
        };
        if !self.store.update(owner_id, &request.id, &update).await? {
            return Err(AppError::SessionNotFound { id: request.id });
        }
        self.get(owner_id, &request.id).await
    }

    /// Idempotent: deleting a missing or foreign session succeeds silently.
    pub async fn delete(&self, owner_id: &str, session_id: &str) -> Result<(), AppError> {
        if session_id.trim().is_empty() {
            return Err(AppError::EmptyField { field_name: "id".to_string() });
        }
        let removed = self.store.delete(owner_id, session_id).await?;
        info!(session_id, removed, "session delete requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn create_request(id: &str, title: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            session_id: Some(id.into()),
            title: Some(title.into()),
            messages: vec![],
            model: "m".into(),
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let service = SessionService::new(Arc::new(MemoryStore::new()));
        for i in 0..7 {
            service.create("u1", create_request(&format!("s{i}"), "t")).await.unwrap();
        }

        let tiny = service
            .list("u1", SessionListQuery { page_size: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(tiny.page_size, MIN_PAGE_SIZE);
        assert_eq!(tiny.items.len(), 5);
        assert_eq!(tiny.total, 7);

        let huge = service
            .list("u1", SessionListQuery { page_size: Some(500), page: Some(0), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(huge.page_size, MAX_PAGE_SIZE);
        assert_eq!(huge.page, 1);
        assert_eq!(huge.items.len(), 7);

        let second = service
            .list("u1", SessionListQuery { page_size: Some(5), page: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
    }

    #[tokio::test]
    async fn update_overwrites_only_supplied_fields() {
        let service = SessionService::new(Arc::new(MemoryStore::new()));
        let created = service.create("u1", create_request("s1", "Draft")).await.unwrap();

        let updated = service
            .update(
                "u1",
                UpdateSessionRequest {
                    id: "s1".into(),
                    title: Some("Final".into()),
                    messages: None,
                    model: None,
                    temperature: Some(0.1),
                    top_p: None,
                    max_tokens: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.temperature, 0.1);
        assert_eq!(updated.model, created.model);
        assert!(updated.updated_at >= created.updated_at);

        let missing = service
            .update(
                "u2",
                UpdateSessionRequest {
                    id: "s1".into(),
                    title: Some("Stolen".into()),
                    messages: None,
                    model: None,
                    temperature: None,
                    top_p: None,
                    max_tokens: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(AppError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn create_generates_id_and_default_title() {
        let service = SessionService::new(Arc::new(MemoryStore::new()));
        let session = service
            .create(
                "u1",
                CreateSessionRequest {
                    session_id: None,
                    title: None,
                    ..create_request("", "")
                },
            )
            .await
            .unwrap();
        assert!(Uuid::parse_str(&session.session_id).is_ok());
        assert_eq!(session.title, "New chat");
    }
}
