use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::SessionStore;
use crate::errors::AppError;
use crate::models::{ChatMessage, ChatSession, GenerationConfig, MessageRole, SessionUpdate};

const TITLE_MAX_CHARS: usize = 60;
const FALLBACK_TITLE: &str = "New chat";

/// What the pre-step writes for one incoming turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilePlan {
    /// No stored session yet: persist the whole transcript as supplied.
    Create { messages: Vec<ChatMessage> },
    /// Stored session exists: append only the latest user message.
    Append { message: ChatMessage },
    /// Latest user message is already stored last; refresh timestamps and config only.
    Touch,
}

impl ReconcilePlan {
    pub fn decide(stored: Option<&ChatSession>, incoming: &[ChatMessage]) -> Self {
        let Some(stored) = stored else {
            return ReconcilePlan::Create { messages: incoming.to_vec() };
        };
        match latest_user_message(incoming) {
            Some(latest) if stored.messages.last() != Some(latest) => {
                ReconcilePlan::Append { message: latest.clone() }
            }
            _ => ReconcilePlan::Touch,
        }
    }
}

fn latest_user_message(messages: &[ChatMessage]) -> Option<&ChatMessage> {
    messages.iter().rev().find(|m| m.role == MessageRole::User)
}

/// Title from the first non-empty user message, cut to 60 characters.
pub fn derive_title(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.trim())
        .find(|c| !c.is_empty())
        .map(|c| c.chars().take(TITLE_MAX_CHARS).collect())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

/// Keeps the stored session consistent with what was streamed.
/// Best effort: callers log failures instead of propagating them to the stream.
#[derive(Clone)]
pub struct TranscriptReconciler {
    store: Arc<dyn SessionStore>,
}

impl TranscriptReconciler {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Pre-step, run before the upstream call.
    pub async fn prepare(
        &self,
        owner_id: &str,
        session_id: &str,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        title: Option<&str>,
    ) -> Result<ReconcilePlan, AppError> {
        let stored = self.store.find(owner_id, session_id).await?;
        let plan = ReconcilePlan::decide(stored.as_ref(), messages);

        match &plan {
            ReconcilePlan::Create { messages } => {
                let title = title
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| derive_title(messages));
                let session = ChatSession::new(
                    session_id.to_string(),
                    owner_id.to_string(),
                    title,
                    messages.clone(),
                    config,
                );
                self.store.insert(&session).await?;
            }
            ReconcilePlan::Append { message } => {
                self.store
                    .append_messages(
                        owner_id,
                        session_id,
                        std::slice::from_ref(message),
                        &SessionUpdate::with_config(config),
                    )
                    .await?;
            }
            ReconcilePlan::Touch => {
                self.store
                    .update(owner_id, session_id, &SessionUpdate::with_config(config))
                    .await?;
            }
        }
        debug!(session_id, ?plan, "transcript prepared");
        Ok(plan)
    }

    /// Post-step, run once the reply has been fully streamed.
    /// Returns `false` when the session no longer exists.
    pub async fn complete(
        &self,
        owner_id: &str,
        session_id: &str,
        reply: &str,
    ) -> Result<bool, AppError> {
        let appended = self
            .store
            .append_messages(
                owner_id,
                session_id,
                &[ChatMessage::assistant(reply)],
                &SessionUpdate::touch(),
            )
            .await?;
        if !appended {
            warn!(session_id, "session vanished before the reply could be stored");
        }
        Ok(appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn config(model: &str) -> GenerationConfig {
        GenerationConfig { model: model.into(), temperature: 0.7, top_p: 0.95, max_tokens: None }
    }

    #[test]
    fn title_uses_first_non_empty_user_message() {
        let messages = vec![
            ChatMessage::new(MessageRole::System, "You are helpful"),
            ChatMessage::user("   "),
            ChatMessage::user("  Explain borrowing  "),
        ];
        assert_eq!(derive_title(&messages), "Explain borrowing");

        let long = "é".repeat(80);
        assert_eq!(derive_title(&[ChatMessage::user(long)]).chars().count(), 60);
        assert_eq!(derive_title(&[]), "New chat");
    }

    #[test]
    fn plan_appends_only_a_new_latest_user_message() {
        let mut stored = ChatSession::new(
            "s1".into(),
            "u1".into(),
            "t".into(),
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            &config("m"),
        );
        let incoming = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("how are you?"),
        ];
        assert_eq!(
            ReconcilePlan::decide(Some(&stored), &incoming),
            ReconcilePlan::Append { message: ChatMessage::user("how are you?") }
        );

        stored.messages.push(ChatMessage::user("how are you?"));
        assert_eq!(ReconcilePlan::decide(Some(&stored), &incoming), ReconcilePlan::Touch);

        assert_eq!(
            ReconcilePlan::decide(None, &incoming),
            ReconcilePlan::Create { messages: incoming.clone() }
        );
    }

    #[tokio::test]
    async fn repeated_prepare_does_not_duplicate_user_message() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TranscriptReconciler::new(store.clone());
        let first = vec![ChatMessage::user("hi")];

        let plan = reconciler.prepare("u1", "s1", &first, &config("m1"), None).await.unwrap();
        assert!(matches!(plan, ReconcilePlan::Create { .. }));
        reconciler.complete("u1", "s1", "hello").await.unwrap();

        let second = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("again"),
        ];
        reconciler.prepare("u1", "s1", &second, &config("m2"), None).await.unwrap();
        let plan = reconciler.prepare("u1", "s1", &second, &config("m2"), None).await.unwrap();
        assert_eq!(plan, ReconcilePlan::Touch);

        let stored = store.find("u1", "s1").await.unwrap().unwrap();
        assert_eq!(stored.messages, second);
        assert_eq!(stored.model, "m2");
        assert_eq!(stored.title, "hi");
    }

    #[tokio::test]
    async fn later_turn_without_max_tokens_clears_the_stored_limit() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TranscriptReconciler::new(store.clone());
        let limited = GenerationConfig { max_tokens: Some(512), ..config("m") };

        reconciler.prepare("u1", "s1", &[ChatMessage::user("hi")], &limited, None).await.unwrap();
        reconciler.complete("u1", "s1", "hello").await.unwrap();
        assert_eq!(store.find("u1", "s1").await.unwrap().unwrap().max_tokens, Some(512));

        let next = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("more"),
        ];
        reconciler.prepare("u1", "s1", &next, &config("m"), None).await.unwrap();
        let stored = store.find("u1", "s1").await.unwrap().unwrap();
        assert_eq!(stored.max_tokens, None);
        assert_eq!(stored.messages.len(), 3);

        reconciler.prepare("u1", "s1", &next, &limited, None).await.unwrap();
        reconciler.prepare("u1", "s1", &next, &config("m"), None).await.unwrap();
        assert_eq!(store.find("u1", "s1").await.unwrap().unwrap().max_tokens, None);
    }

    #[tokio::test]
    async fn complete_is_a_no_op_for_missing_session() {
        let reconciler = TranscriptReconciler::new(Arc::new(MemoryStore::new()));
        assert!(!reconciler.complete("u1", "missing", "reply").await.unwrap());
    }

    #[tokio::test]
    async fn supplied_title_wins_over_derived_one() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TranscriptReconciler::new(store.clone());
        reconciler
            .prepare("u1", "s1", &[ChatMessage::user("hi")], &config("m"), Some("Homework"))
            .await
            .unwrap();
        assert_eq!(store.find("u1", "s1").await.unwrap().unwrap().title, "Homework");
    }
}
