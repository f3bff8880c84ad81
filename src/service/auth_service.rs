use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::UserStore;
use crate::errors::AppError;
use crate::models::{Credentials, LoginResponse, RegisteredUser, User};

const MIN_PASSWORD_LEN: usize = 6;

/// SHA-256 of a bearer token (lowercase hex). Only the digest is stored.
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Unexpected(format!("Failed to hash password: {e}")))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {e}");
            false
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registration, password login and bearer-token identity.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn register(&self, credentials: Credentials) -> Result<RegisteredUser, AppError> {
        let email = normalize_email(&credentials.email);
        if email.is_empty() {
            return Err(AppError::EmptyField { field_name: "email".to_string() });
        }
        if !email.contains('@') {
            return Err(AppError::InvalidRequest(format!("'{email}' is not an email address")));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::InvalidRequest(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let user = User::new(email, hash_password(&credentials.password)?);
        self.users.insert_user(&user).await?;
        info!(user_id = %user.id, "user registered");
        Ok(RegisteredUser { id: user.id, email: user.email })
    }

    pub async fn login(&self, credentials: Credentials) -> Result<LoginResponse, AppError> {
        let email = normalize_email(&credentials.email);
        let user = self
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;
        if !verify_password(&credentials.password, &user.password_hash) {
            warn!(user_id = %user.id, "login rejected");
            return Err(AppError::InvalidCredentials);
        }

        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.users.insert_token(&hash_token(&token), &user.id).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(LoginResponse { token, user_id: user.id })
    }

    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.users.delete_token(&hash_token(token)).await
    }

    /// Resolves a bearer token to the owning user id.
    pub async fn identify(&self, token: &str) -> Result<Option<String>, AppError> {
        self.users.find_token_user(&hash_token(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials { email: email.into(), password: password.into() }
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-phc-string"));
    }

    #[test]
    fn token_digest_is_hex_sha256() {
        let digest = hash_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn register_normalizes_and_rejects_duplicates() {
        let auth = AuthService::new(Arc::new(MemoryStore::new()));
        let user = auth.register(creds("  User@Example.com ", "secret1")).await.unwrap();
        assert_eq!(user.email, "user@example.com");

        let again = auth.register(creds("user@example.com", "another1")).await;
        assert!(matches!(again, Err(AppError::EmailTaken { .. })));

        assert!(auth.register(creds("nobody", "secret1")).await.unwrap_err().is_validation());
        assert!(auth.register(creds("a@b.c", "123")).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn login_issues_token_that_identifies_user() {
        let auth = AuthService::new(Arc::new(MemoryStore::new()));
        let user = auth.register(creds("user@example.com", "secret1")).await.unwrap();

        assert!(matches!(
            auth.login(creds("user@example.com", "wrong!!")).await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login(creds("ghost@example.com", "secret1")).await,
            Err(AppError::InvalidCredentials)
        ));

        let session = auth.login(creds("USER@example.com", "secret1")).await.unwrap();
        assert_eq!(session.user_id, user.id);
        assert_eq!(auth.identify(&session.token).await.unwrap(), Some(user.id));

        auth.logout(&session.token).await.unwrap();
        assert_eq!(auth.identify(&session.token).await.unwrap(), None);
    }
}
