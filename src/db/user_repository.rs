use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::error;

use super::UserStore;
use crate::errors::AppError;
use crate::models::User;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                AppError::EmailTaken { email: user.email.clone() }
            }
            _ => {
                error!("Failed to insert user {}: {e}", user.email);
                AppError::db_query("Failed to insert user", e)
            }
        })?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map(|row| {
            row.map(|r| User {
                id: r.id,
                email: r.email,
                password_hash: r.password_hash,
                created_at: r.created_at,
            })
        })
        .map_err(|e| {
            error!("Failed to find user {email}: {e}");
            AppError::db_query("Failed to find user", e)
        })
    }

    async fn insert_token(&self, token_hash: &str, user_id: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO auth_tokens (token_hash, user_id, created_at) VALUES ($1, $2, $3)")
            .bind(token_hash)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db_query("Failed to store auth token", e))?;
        Ok(())
    }

    async fn find_token_user(&self, token_hash: &str) -> Result<Option<String>, AppError> {
        sqlx::query_scalar::<_, String>("SELECT user_id FROM auth_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::db_query("Failed to look up auth token", e))
    }

    async fn delete_token(&self, token_hash: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM auth_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::db_query("Failed to delete auth token", e))?;
        Ok(())
    }
}
