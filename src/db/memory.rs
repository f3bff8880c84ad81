use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionStore, UserStore};
use crate::errors::AppError;
use crate::models::{ChatMessage, ChatSession, SessionQuery, SessionSummary, SessionUpdate, User};

type SessionKey = (String, String);

fn key(owner_id: &str, session_id: &str) -> SessionKey {
    (owner_id.to_string(), session_id.to_string())
}

/// In-process store used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionKey, ChatSession>>,
    users: RwLock<HashMap<String, User>>,
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: &ChatSession) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let k = key(&session.owner_id, &session.session_id);
        if sessions.contains_key(&k) {
            return Err(AppError::SessionExists { id: session.session_id.clone() });
        }
        sessions.insert(k, session.clone());
        Ok(())
    }

    async fn find(&self, owner_id: &str, session_id: &str) -> Result<Option<ChatSession>, AppError> {
        Ok(self.sessions.read().await.get(&key(owner_id, session_id)).cloned())
    }

    async fn list(
        &self,
        owner_id: &str,
        query: &SessionQuery,
    ) -> Result<(Vec<SessionSummary>, u64), AppError> {
        let needle = query.title_contains.as_ref().map(|q| q.to_lowercase());
        let sessions = self.sessions.read().await;
        let mut matching: Vec<&ChatSession> = sessions
            .values()
            .filter(|s| s.owner_id == owner_id)
            .filter(|s| match &needle {
                Some(n) => s.title.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .map(ChatSession::summary)
            .collect();
        Ok((page, total))
    }

    async fn update(
        &self,
        owner_id: &str,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<bool, AppError> {
        match self.sessions.write().await.get_mut(&key(owner_id, session_id)) {
            Some(session) => {
                session.apply(update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_messages(
        &self,
        owner_id: &str,
        session_id: &str,
        messages: &[ChatMessage],
        update: &SessionUpdate,
    ) -> Result<bool, AppError> {
        match self.sessions.write().await.get_mut(&key(owner_id, session_id)) {
            Some(session) => {
                session.messages.extend_from_slice(messages);
                session.apply(&SessionUpdate { messages: None, ..update.clone() });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, owner_id: &str, session_id: &str) -> Result<bool, AppError> {
        Ok(self.sessions.write().await.remove(&key(owner_id, session_id)).is_some())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(AppError::EmailTaken { email: user.email.clone() });
        }
        users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn insert_token(&self, token_hash: &str, user_id: &str) -> Result<(), AppError> {
        self.tokens
            .write()
            .await
            .insert(token_hash.to_string(), user_id.to_string());
        Ok(())
    }

    async fn find_token_user(&self, token_hash: &str) -> Result<Option<String>, AppError> {
        Ok(self.tokens.read().await.get(token_hash).cloned())
    }

    async fn delete_token(&self, token_hash: &str) -> Result<(), AppError> {
        self.tokens.write().await.remove(token_hash);
        Ok(())
    }
}
