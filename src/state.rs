use std::sync::Arc;

use crate::agent::TextGenerator;
use crate::db::{SessionStore, UserStore};
use crate::service::auth_service::AuthService;
use crate::service::chat_service::ChatService;
use crate::service::session_service::SessionService;
use crate::service::transcript::TranscriptReconciler;

/// Shared handler state. Every field is a cheap clone over `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub sessions: SessionService,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        session_store: Arc<dyn SessionStore>,
        user_store: Arc<dyn UserStore>,
    ) -> Self {
        let transcripts = TranscriptReconciler::new(session_store.clone());
        Self {
            chat: ChatService::new(generator, transcripts),
            sessions: SessionService::new(session_store),
            auth: AuthService::new(user_store),
        }
    }
}
