use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::audit::AuditEntry;
use crate::error::DatabaseError;
use crate::repository::{AuditLog, CredentialStore, TokenField, TokenStore, User};

fn poisoned() -> DatabaseError {
    DatabaseError::UnexpectedError("in-memory store lock poisoned".to_string())
}

/// Users keyed by username
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a user. Returns the assigned id.
    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<i64, DatabaseError> {
        let mut users = self.users.lock().map_err(|_| poisoned())?;
        let id = users.values().map(|u| u.id).max().unwrap_or(0) + 1;
        users.insert(
            username.to_string(),
            User {
                id,
                username: username.to_string(),
                password: password_hash.to_string(),
                last_login: None,
                last_logout: None,
            },
        );
        Ok(id)
    }

    pub fn remove_user(&self, username: &str) -> Result<(), DatabaseError> {
        self.users.lock().map_err(|_| poisoned())?.remove(username);
        Ok(())
    }

    fn touch(&self, id: i64, apply: impl Fn(&mut User)) -> Result<(), DatabaseError> {
        let mut users = self.users.lock().map_err(|_| poisoned())?;
        if let Some(user) = users.values_mut().find(|u| u.id == id) {
            apply(user);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let users = self.users.lock().map_err(|_| poisoned())?;
        Ok(users.get(username).cloned())
    }

    async fn update_last_login(&self, id: i64) -> Result<(), DatabaseError> {
        self.touch(id, |u| u.last_login = Some(Utc::now()))
    }

    async fn update_last_logout(&self, id: i64) -> Result<(), DatabaseError> {
        self.touch(id, |u| u.last_logout = Some(Utc::now()))
    }
}

/// Refresh tokens keyed by username
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<String, String>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token currently on file for `username`
    pub fn token_for(&self, username: &str) -> Option<String> {
        self.tokens
            .lock()
            .ok()
            .and_then(|t| t.get(username).cloned())
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn exists(&self, field: TokenField, value: &str) -> Result<bool, DatabaseError> {
        let tokens = self.tokens.lock().map_err(|_| poisoned())?;
        Ok(match field {
            TokenField::Username => tokens.contains_key(value),
            TokenField::Token => tokens.values().any(|t| t == value),
        })
    }

    async fn create(&self, username: &str, token: &str) -> Result<bool, DatabaseError> {
        let mut tokens = self.tokens.lock().map_err(|_| poisoned())?;
        tokens.insert(username.to_string(), token.to_string());
        Ok(true)
    }

    async fn update(&self, username: &str, token: &str) -> Result<bool, DatabaseError> {
        let mut tokens = self.tokens.lock().map_err(|_| poisoned())?;
        match tokens.get_mut(username) {
            Some(slot) => {
                *slot = token.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, username: &str) -> Result<bool, DatabaseError> {
        let mut tokens = self.tokens.lock().map_err(|_| poisoned())?;
        Ok(tokens.remove(username).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn add_log(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        self.entries.lock().map_err(|_| poisoned())?.push(entry.clone());
        Ok(())
    }
}
