pub mod memory;
pub mod session_repository;
pub mod user_repository;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{ChatMessage, ChatSession, SessionQuery, SessionSummary, SessionUpdate, User};

/// Owner-scoped document store for chat sessions.
/// Every lookup is keyed by `(owner_id, session_id)`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fails with `SessionExists` when the owner already has that id.
    async fn insert(&self, session: &ChatSession) -> Result<(), AppError>;

    async fn find(&self, owner_id: &str, session_id: &str) -> Result<Option<ChatSession>, AppError>;

    /// Summaries sorted by `updated_at` descending, plus the unpaginated total.
    async fn list(
        &self,
        owner_id: &str,
        query: &SessionQuery,
    ) -> Result<(Vec<SessionSummary>, u64), AppError>;

    /// Returns `false` when no matching session exists.
    async fn update(
        &self,
        owner_id: &str,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<bool, AppError>;

    /// Appends to the stored transcript and applies `update` in one atomic write.
    async fn append_messages(
        &self,
        owner_id: &str,
        session_id: &str,
        messages: &[ChatMessage],
        update: &SessionUpdate,
    ) -> Result<bool, AppError>;

    async fn delete(&self, owner_id: &str, session_id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `EmailTaken` on a duplicate email.
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn insert_token(&self, token_hash: &str, user_id: &str) -> Result<(), AppError>;

    async fn find_token_user(&self, token_hash: &str) -> Result<Option<String>, AppError>;

    async fn delete_token(&self, token_hash: &str) -> Result<(), AppError>;
}
