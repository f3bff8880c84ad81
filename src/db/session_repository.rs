use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::error;

use super::SessionStore;
use crate::errors::AppError;
use crate::models::{ChatMessage, ChatSession, SessionQuery, SessionSummary, SessionUpdate};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    owner_id: String,
    title: String,
    messages: Json<Vec<ChatMessage>>,
    model: String,
    temperature: f64,
    top_p: f64,
    max_tokens: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for ChatSession {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            owner_id: row.owner_id,
            title: row.title,
            messages: row.messages.0,
            model: row.model,
            temperature: row.temperature,
            top_p: row.top_p,
            max_tokens: row.max_tokens.map(|n| n.max(0) as u32),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    session_id: String,
    owner_id: String,
    title: String,
    model: String,
    temperature: f64,
    top_p: f64,
    max_tokens: Option<i32>,
    message_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SummaryRow> for SessionSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            session_id: row.session_id,
            owner_id: row.owner_id,
            title: row.title,
            model: row.model,
            temperature: row.temperature,
            top_p: row.top_p,
            max_tokens: row.max_tokens.map(|n| n.max(0) as u32),
            message_count: i64::from(row.message_count),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Escapes LIKE wildcards so a title filter matches literally.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn to_i32(n: Option<u32>) -> Option<i32> {
    n.map(|n| i32::try_from(n).unwrap_or(i32::MAX))
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn insert(&self, session: &ChatSession) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO chat_sessions
                (session_id, owner_id, title, messages, model, temperature, top_p, max_tokens,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&session.session_id)
        .bind(&session.owner_id)
        .bind(&session.title)
        .bind(Json(&session.messages))
        .bind(&session.model)
        .bind(session.temperature)
        .bind(session.top_p)
        .bind(to_i32(session.max_tokens))
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::SessionExists { id: session.session_id.clone() }
            }
            _ => {
                error!("Failed to insert session {}: {e}", session.session_id);
                AppError::db_query("Failed to insert session", e)
            }
        })?;
        Ok(())
    }

    async fn find(&self, owner_id: &str, session_id: &str) -> Result<Option<ChatSession>, AppError> {
        sqlx::query_as::<_, SessionRow>(
            "SELECT session_id, owner_id, title, messages, model, temperature, top_p, max_tokens,
                    created_at, updated_at
             FROM chat_sessions
             WHERE owner_id = $1 AND session_id = $2",
        )
        .bind(owner_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map(|row| row.map(ChatSession::from))
        .map_err(|e| {
            error!("Failed to find session {session_id}: {e}");
            AppError::db_query(format!("Failed to find session {session_id}"), e)
        })
    }

    async fn list(
        &self,
        owner_id: &str,
        query: &SessionQuery,
    ) -> Result<(Vec<SessionSummary>, u64), AppError> {
        let pattern = query.title_contains.as_deref().map(like_pattern);

        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT session_id, owner_id, title, model, temperature, top_p, max_tokens,
                    jsonb_array_length(messages) AS message_count, created_at, updated_at
             FROM chat_sessions
             WHERE owner_id = $1 AND ($2::text IS NULL OR title ILIKE $2)
             ORDER BY updated_at DESC
             OFFSET $3 LIMIT $4",
        )
        .bind(owner_id)
        .bind(pattern.as_deref())
        .bind(query.skip as i64)
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list sessions for {owner_id}: {e}");
            AppError::db_query("Failed to list sessions", e)
        })?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_sessions
             WHERE owner_id = $1 AND ($2::text IS NULL OR title ILIKE $2)",
        )
        .bind(owner_id)
        .bind(pattern.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::db_query("Failed to count sessions", e))?;

        Ok((rows.into_iter().map(SessionSummary::from).collect(), total.max(0) as u64))
    }

    async fn update(
        &self,
        owner_id: &str,
        session_id: &str,
        update: &SessionUpdate,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET
                title = COALESCE($3, title),
                messages = COALESCE($4, messages),
                model = COALESCE($5, model),
                temperature = COALESCE($6, temperature),
                top_p = COALESCE($7, top_p),
                max_tokens = CASE WHEN $8 THEN $9 ELSE max_tokens END,
                updated_at = $10
             WHERE owner_id = $1 AND session_id = $2",
        )
        .bind(owner_id)
        .bind(session_id)
        .bind(update.title.as_deref())
        .bind(update.messages.as_ref().map(Json))
        .bind(update.model.as_deref())
        .bind(update.temperature)
        .bind(update.top_p)
        .bind(update.max_tokens.is_some())
        .bind(to_i32(update.max_tokens.flatten()))
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update session {session_id}: {e}");
            AppError::db_query("Failed to update session", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_messages(
        &self,
        owner_id: &str,
        session_id: &str,
        messages: &[ChatMessage],
        update: &SessionUpdate,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET
                messages = messages || $3::jsonb,
                title = COALESCE($4, title),
                model = COALESCE($5, model),
                temperature = COALESCE($6, temperature),
                top_p = COALESCE($7, top_p),
                max_tokens = CASE WHEN $8 THEN $9 ELSE max_tokens END,
                updated_at = $10
             WHERE owner_id = $1 AND session_id = $2",
        )
        .bind(owner_id)
        .bind(session_id)
        .bind(Json(messages))
        .bind(update.title.as_deref())
        .bind(update.model.as_deref())
        .bind(update.temperature)
        .bind(update.top_p)
        .bind(update.max_tokens.is_some())
        .bind(to_i32(update.max_tokens.flatten()))
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to append to session {session_id}: {e}");
            AppError::db_query("Failed to append messages", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, owner_id: &str, session_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE owner_id = $1 AND session_id = $2")
            .bind(owner_id)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete session {session_id}: {e}");
                AppError::db_query("Failed to delete session", e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}
