/// Authentication Routes
///
/// Login, token renewal, logout and the current-user lookup. Each handler
/// converts its `AppError` into the `{status, message, errors}` envelope and
/// writes an audit entry before responding.

use actix_web::{
    http::{header, StatusCode},
    web, Either, HttpRequest, HttpResponse,
};
use actix_web::HttpMessage;
use serde::{Deserialize, Serialize};

use crate::audit::{self, AuditEntry};
use crate::auth::{AccessClaims, TokenPair};
use crate::error::{AppError, ErrorHandler, RequestContext, ValidationError};
use crate::logger::RequestId;
use crate::startup::AppState;
use crate::validators::{validate_password, validate_token, validate_username};

/// JSON or urlencoded form body
type Body<T> = Result<Either<web::Json<T>, web::Form<T>>, actix_web::Error>;

/// An absent body reads as empty so every field reports as required. A body
/// that was sent but does not decode is rejected as a whole.
fn into_inner<T: Default>(req: &HttpRequest, body: Body<T>) -> Result<T, AppError> {
    match body {
        Ok(Either::Left(json)) => Ok(json.into_inner()),
        Ok(Either::Right(form)) => Ok(form.into_inner()),
        Err(_) if !has_payload(req) => Ok(T::default()),
        Err(e) => {
            tracing::debug!(error = %e, "Request body could not be decoded");
            Err(AppError::from(ValidationError::Undecodable("body")))
        }
    }
}

fn has_payload(req: &HttpRequest) -> bool {
    match req.headers().get(header::CONTENT_LENGTH) {
        Some(length) => length
            .to_str()
            .ok()
            .and_then(|l| l.parse::<u64>().ok())
            .map_or(true, |l| l > 0),
        None => req.headers().contains_key(header::TRANSFER_ENCODING),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    /// Validate both fields, reporting every failure at once
    fn validate(self) -> Result<(String, String), AppError> {
        let username = validate_username(self.username.as_deref());
        let password = validate_password(self.password.as_deref());

        match (username, password) {
            (Ok(username), Ok(password)) => Ok((username, password)),
            (username, password) => {
                let errors: Vec<ValidationError> =
                    username.err().into_iter().chain(password.err()).collect();
                Err(AppError::from(errors))
            }
        }
    }
}

/// Body for renew and logout
#[derive(Debug, Deserialize, Default)]
pub struct TokenRequest {
    pub token: Option<String>,
}

impl TokenRequest {
    fn validate(self) -> Result<String, AppError> {
        Ok(validate_token(self.token.as_deref())?)
    }
}

/// Success envelope
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: &str, data: T) -> HttpResponse {
        HttpResponse::Ok().json(Self {
            status: StatusCode::OK.as_u16(),
            message: message.to_string(),
            data,
        })
    }
}

#[derive(Serialize)]
pub struct RenewData {
    pub access_token: String,
}

/// Public view of a user
#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub last_login: Option<String>,
    pub last_logout: Option<String>,
}

fn request_context(req: &HttpRequest, operation: &str) -> RequestContext {
    let ctx = RequestContext::new(operation, req.path());
    let request_id = req.extensions().get::<RequestId>().map(|id| id.0.clone());
    match request_id {
        Some(id) => ctx.with_request_id(id),
        None => ctx,
    }
}

/// Log, audit and render `error`
async fn reject(
    state: &AppState,
    ctx: &RequestContext,
    error: AppError,
    entry: AuditEntry,
) -> HttpResponse {
    error.log_error(ctx);
    audit::record(state.audit.as_ref(), entry).await;

    let (status, body) = ErrorHandler::error_response(&error);
    HttpResponse::build(status).json(body)
}

/// POST /auth/login
///
/// # Errors
/// - 400: username or password missing
/// - 401: unknown username or wrong password
/// - 500: token store failure
pub async fn login(
    req: HttpRequest,
    body: Body<LoginRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let ctx = request_context(&req, "login");

    match login_flow(&ctx, into_inner(&req, body), &state).await {
        Ok(pair) => ApiResponse::ok("Login successful!", pair),
        Err(e) => {
            let entry = AuditEntry::capture(&e, &ctx);
            reject(&state, &ctx, e, entry).await
        }
    }
}

async fn login_flow(
    ctx: &RequestContext,
    body: Result<LoginRequest, AppError>,
    state: &AppState,
) -> Result<TokenPair, AppError> {
    let (username, password) = body?.validate()?;
    state.lifecycle.login(ctx, &username, &password).await
}

/// POST /auth/renew
///
/// Exchanges an on-file refresh token for a new access token.
///
/// # Errors
/// - 400: token missing
/// - 401: invalid signature or expired token
/// - 404: token not on file or user gone
pub async fn renew(
    req: HttpRequest,
    body: Body<TokenRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let ctx = request_context(&req, "renew");

    match renew_flow(&ctx, into_inner(&req, body), &state).await {
        Ok(access_token) => ApiResponse::ok("Token is renewed!", RenewData { access_token }),
        Err(e) => {
            let entry = AuditEntry::capture(&e, &ctx);
            reject(&state, &ctx, e, entry).await
        }
    }
}

async fn renew_flow(
    ctx: &RequestContext,
    body: Result<TokenRequest, AppError>,
    state: &AppState,
) -> Result<String, AppError> {
    let token = body?.validate()?;
    state.lifecycle.renew(ctx, &token).await
}

/// POST /auth/logout
///
/// # Errors
/// - 400: token missing
/// - 401: invalid signature or expired token
/// - 404: token not on file
/// - 500: token store failure
pub async fn logout(
    req: HttpRequest,
    body: Body<TokenRequest>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let ctx = request_context(&req, "logout");

    match logout_flow(&ctx, into_inner(&req, body), &state).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => {
            let entry = AuditEntry::capture(&e, &ctx);
            reject(&state, &ctx, e, entry).await
        }
    }
}

async fn logout_flow(
    ctx: &RequestContext,
    body: Result<TokenRequest, AppError>,
    state: &AppState,
) -> Result<(), AppError> {
    let token = body?.validate()?;
    state.lifecycle.logout(ctx, &token).await
}

/// GET /api/me
///
/// **Requires a valid access token**; claims are injected by `JwtMiddleware`.
pub async fn current_user(
    req: HttpRequest,
    claims: web::ReqData<AccessClaims>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let ctx = request_context(&req, "current_user");

    match state.lifecycle.current_user(&claims.username).await {
        Ok(user) => ApiResponse::ok(
            "User found!",
            UserResponse {
                id: user.id,
                username: user.username,
                last_login: user.last_login.map(|t| t.to_rfc3339()),
                last_logout: user.last_logout.map(|t| t.to_rfc3339()),
            },
        ),
        Err(e) => {
            let entry = AuditEntry::capture(&e, &ctx);
            reject(&state, &ctx, e, entry).await
        }
    }
}
