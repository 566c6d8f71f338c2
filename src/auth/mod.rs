//! User accounts and opaque bearer tokens.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::core::security::{generate_token, hash_password, hash_token, verify_password};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Clone)]
pub struct AuthStore {
    pool: SqlitePool,
    token_ttl: Duration,
}

impl AuthStore {
    pub async fn new(pool: SqlitePool, token_ttl_minutes: i64) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init users table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS access_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init access_tokens table: {}", e)))?;

        Ok(Self {
            pool,
            token_ttl: Duration::minutes(token_ttl_minutes),
        })
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(ApiError::BadRequest(
                "Name, email and password are required".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(ApiError::BadRequest("Email already registered".to_string()));
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
        };
        let password_hash = hash_password(password)?;

        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::info!("Registered user {}", user.id);
        Ok(user)
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String), ApiError> {
        let email = normalize_email(email);
        let row = sqlx::query("SELECT id, name, email, password_hash FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        let stored_hash: String = row.try_get("password_hash")?;
        if !verify_password(password, &stored_hash) {
            return Err(ApiError::Unauthorized);
        }

        let user = User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        };
        let token = self.issue_token(&user.id).await?;
        Ok((user, token))
    }

    pub async fn issue_token(&self, user_id: &str) -> Result<String, ApiError> {
        let token = generate_token();
        let expires_at = (Utc::now() + self.token_ttl).to_rfc3339();

        sqlx::query("INSERT INTO access_tokens (token_hash, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(hash_token(&token))
            .bind(user_id)
            .bind(&expires_at)
            .execute(&self.pool)
            .await?;

        Ok(token)
    }

    /// Resolves a bearer token; expired tokens are deleted on sight.
    pub async fn authenticate(&self, token: &str) -> Result<User, ApiError> {
        let token_hash = hash_token(token);
        let row = sqlx::query(
            "SELECT u.id, u.name, u.email, t.expires_at \
             FROM access_tokens t JOIN users u ON u.id = t.user_id \
             WHERE t.token_hash = ?",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ApiError::Unauthorized)?;

        let expires_at: String = row.try_get("expires_at")?;
        let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map(|t| t.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(true);
        if expired {
            sqlx::query("DELETE FROM access_tokens WHERE token_hash = ?")
                .bind(&token_hash)
                .execute(&self.pool)
                .await?;
            return Err(ApiError::Unauthorized);
        }

        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
