/// Token lifecycle
///
/// Login issues an access/refresh pair and fills the username's single
/// refresh-token slot. Renew trades an on-file refresh token for a new access
/// token. Logout empties the slot.

use std::sync::Arc;

use crate::auth::jwt::{issue_access_token, issue_refresh_token, validate_refresh_token};
use crate::auth::password::verify_password;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, NotFoundError, RequestContext};
use crate::repository::{CredentialStore, TokenField, TokenStore, User};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenLifecycle {
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
    jwt: JwtSettings,
}

impl TokenLifecycle {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        jwt: JwtSettings,
    ) -> Self {
        Self {
            credentials,
            tokens,
            jwt,
        }
    }

    pub fn jwt_settings(&self) -> &JwtSettings {
        &self.jwt
    }

    /// Verify credentials and issue a fresh token pair
    ///
    /// # Errors
    /// - 401: unknown username or wrong password (same message for both)
    /// - 500: signing or token store failure
    pub async fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, AppError> {
        let user = self
            .credentials
            .find_user(username)
            .await?
            .ok_or_else(|| AppError::from(AuthError::InvalidCredentials))?;

        if !verify_password(password, &user.password)? {
            return Err(AppError::from(AuthError::InvalidCredentials));
        }

        let access_token = issue_access_token(&user, &self.jwt)?;
        let refresh_token = issue_refresh_token(&user.username, &self.jwt)?;

        let stored = if self
            .tokens
            .exists(TokenField::Username, &user.username)
            .await?
        {
            self.tokens.update(&user.username, &refresh_token).await?
        } else {
            self.tokens.create(&user.username, &refresh_token).await?
        };

        if !stored {
            return Err(AppError::internal(format!(
                "refresh token for {} was not persisted",
                user.username
            )));
        }

        if let Err(e) = self.credentials.update_last_login(user.id).await {
            tracing::warn!(
                request_id = %ctx.request_id,
                user_id = user.id,
                error = %e,
                "Failed to record last login"
            );
        }

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = user.id,
            username = %user.username,
            "User logged in successfully"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Issue a new access token for an on-file refresh token
    ///
    /// The refresh token itself is not rotated.
    ///
    /// # Errors
    /// - 401: bad signature, wrong issuer or expired
    /// - 404: token not on file, or its user no longer exists
    pub async fn renew(&self, ctx: &RequestContext, token: &str) -> Result<String, AppError> {
        let username = validate_refresh_token(token, &self.jwt)?;

        if !self.tokens.exists(TokenField::Token, token).await? {
            return Err(AppError::from(NotFoundError::Token));
        }

        let user = self
            .credentials
            .find_user(&username)
            .await?
            .ok_or_else(|| AppError::from(NotFoundError::User))?;

        let access_token = issue_access_token(&user, &self.jwt)?;

        tracing::info!(
            request_id = %ctx.request_id,
            user_id = user.id,
            "Access token renewed"
        );

        Ok(access_token)
    }

    /// Drop the refresh token on file for the token's username
    ///
    /// # Errors
    /// - 401: bad signature, wrong issuer or expired
    /// - 404: token not on file
    /// - 500: the slot could not be deleted
    pub async fn logout(&self, ctx: &RequestContext, token: &str) -> Result<(), AppError> {
        let username = validate_refresh_token(token, &self.jwt)?;

        if !self.tokens.exists(TokenField::Token, token).await? {
            return Err(AppError::from(NotFoundError::Token));
        }

        if !self.tokens.delete(&username).await? {
            return Err(AppError::internal(format!(
                "refresh token for {} was not deleted",
                username
            )));
        }

        self.record_logout(ctx, &username).await;

        tracing::info!(
            request_id = %ctx.request_id,
            username = %username,
            "User logged out"
        );

        Ok(())
    }

    /// Fetch the user an access token was issued to
    pub async fn current_user(&self, username: &str) -> Result<User, AppError> {
        self.credentials
            .find_user(username)
            .await?
            .ok_or_else(|| AppError::from(NotFoundError::User))
    }

    async fn record_logout(&self, ctx: &RequestContext, username: &str) {
        let user = match self.credentials.find_user(username).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, error = %e, "Failed to load user for logout timestamp");
                return;
            }
        };

        if let Err(e) = self.credentials.update_last_logout(user.id).await {
            tracing::warn!(
                request_id = %ctx.request_id,
                user_id = user.id,
                error = %e,
                "Failed to record last logout"
            );
        }
    }
}
