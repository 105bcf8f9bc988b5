/// Persistence seams
///
/// The lifecycle service only talks to these traits. `postgres` backs the
/// running server; `memory` backs tests and local experiments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditEntry;
use crate::error::DatabaseError;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryAuditLog, InMemoryCredentialStore, InMemoryTokenStore};
pub use postgres::{PgAuditLog, PgCredentialStore, PgTokenStore};

/// A provisioned user as stored. `password` holds the bcrypt hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub last_login: Option<DateTime<Utc>>,
    pub last_logout: Option<DateTime<Utc>>,
}

/// Column a refresh-token existence check looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenField {
    Username,
    Token,
}

impl TokenField {
    pub fn column(&self) -> &'static str {
        match self {
            TokenField::Username => "username",
            TokenField::Token => "token",
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>, DatabaseError>;
    async fn update_last_login(&self, id: i64) -> Result<(), DatabaseError>;
    async fn update_last_logout(&self, id: i64) -> Result<(), DatabaseError>;
}

/// Single refresh-token slot per username.
///
/// Write operations return `false` when no row was written.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn exists(&self, field: TokenField, value: &str) -> Result<bool, DatabaseError>;
    async fn create(&self, username: &str, token: &str) -> Result<bool, DatabaseError>;
    async fn update(&self, username: &str, token: &str) -> Result<bool, DatabaseError>;
    async fn delete(&self, username: &str) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn add_log(&self, entry: &AuditEntry) -> Result<(), DatabaseError>;
}
