use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::audit::AuditEntry;
use crate::error::DatabaseError;
use crate::repository::{AuditLog, CredentialStore, TokenField, TokenStore, User};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password, last_login, last_logout
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_last_login(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_last_logout(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET last_logout = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn exists(&self, field: TokenField, value: &str) -> Result<bool, DatabaseError> {
        // Column name comes from a closed enum, never from input
        let query = format!(
            "SELECT EXISTS(SELECT 1 FROM refresh_tokens WHERE {} = $1)",
            field.column()
        );

        let exists = sqlx::query_scalar::<_, bool>(&query)
            .bind(value)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn create(&self, username: &str, token: &str) -> Result<bool, DatabaseError> {
        // A racing first login for the same username becomes an overwrite
        let result = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (username, token, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (username)
            DO UPDATE SET token = EXCLUDED.token, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(username)
        .bind(token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update(&self, username: &str, token: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token = $1, updated_at = $2
            WHERE username = $3
            "#,
        )
        .bind(token)
        .bind(Utc::now())
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, username: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn add_log(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO auth_logs
                (request_id, accessed_url_path, message, code, file, line, trace, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.request_id)
        .bind(&entry.accessed_url_path)
        .bind(&entry.message)
        .bind(entry.code as i32)
        .bind(&entry.file)
        .bind(entry.line as i32)
        .bind(&entry.trace)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
