/// JWT Token Issuing and Validation
///
/// Access and refresh tokens are HS256 JWTs signed with separate secrets from
/// `JwtSettings`. Issuing is stateless; persistence of refresh tokens lives in
/// the token store.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::claims::{AccessClaims, RefreshClaims};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::repository::User;

/// Issue a short-lived access token for `user`
///
/// # Errors
/// Returns `AuthError::SigningKeyUnavailable` if no access secret is configured
pub fn issue_access_token(user: &User, config: &JwtSettings) -> Result<String, AppError> {
    let claims = AccessClaims::new(user, config.access_token_expiry, config.issuer.clone());
    sign(&claims, &config.secret)
}

/// Issue a refresh token for `username`
///
/// # Errors
/// Returns `AuthError::SigningKeyUnavailable` if no refresh secret is configured
pub fn issue_refresh_token(username: &str, config: &JwtSettings) -> Result<String, AppError> {
    let claims = RefreshClaims::new(
        username.to_string(),
        config.refresh_token_expiry,
        config.issuer.clone(),
    );
    sign(&claims, &config.refresh_secret)
}

/// Validate a refresh token and return the username it was issued for
///
/// # Errors
/// - `AuthError::TokenExpired` when the token is past its expiry
/// - `AuthError::TokenInvalid` for bad signatures, wrong issuer or garbage input
pub fn validate_refresh_token(token: &str, config: &JwtSettings) -> Result<String, AppError> {
    verify::<RefreshClaims>(token, &config.refresh_secret, &config.issuer)
        .map(|claims| claims.username)
}

/// Validate an access token and extract its claims
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<AccessClaims, AppError> {
    verify::<AccessClaims>(token, &config.secret, &config.issuer)
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, AppError> {
    if secret.is_empty() {
        tracing::error!("JWT signing secret is not configured");
        return Err(AppError::from(AuthError::SigningKeyUnavailable));
    }

    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("Token generation failed: {}", e)))
}

fn verify<T: DeserializeOwned>(token: &str, secret: &str, issuer: &str) -> Result<T, AppError> {
    if secret.is_empty() {
        tracing::error!("JWT verification secret is not configured");
        return Err(AppError::from(AuthError::SigningKeyUnavailable));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);
    validation.leeway = 0;

    decode::<T>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                tracing::info!("JWT expired");
                AppError::from(AuthError::TokenExpired)
            }
            _ => {
                tracing::warn!("JWT validation error: {}", e);
                AppError::from(AuthError::TokenInvalid)
            }
        })
}
