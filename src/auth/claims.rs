/// JWT Claims structures
///
/// Access tokens carry the user's public identity; refresh tokens carry only
/// the username plus a unique id so that every issued refresh token differs.

use serde::{Deserialize, Serialize};

use crate::repository::User;

/// Claims embedded in access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: i64,
    pub username: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
}

impl AccessClaims {
    /// Build claims for `user`. The password hash never leaves the store.
    pub fn new(user: &User, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.id,
            username: user.username.clone(),
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }
}

/// Claims embedded in refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshClaims {
    pub username: String,
    /// Token id, random per issue
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl RefreshClaims {
    pub fn new(username: String, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            username,
            jti: uuid::Uuid::new_v4().to_string(),
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }
}
