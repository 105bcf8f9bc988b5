/// Error Handling Module
///
/// Every failure in the service maps to one `AppError` variant. The variant
/// decides the HTTP status, the public message placed in the response
/// envelope and the log level used when it is reported.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Field-level validation failures for request bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Required(&'static str),
    TooLong(&'static str, usize),
    SuspiciousContent(&'static str),
    /// A body was sent but could not be decoded into the expected fields
    Undecodable(&'static str),
}

impl ValidationError {
    /// Name of the request field that failed validation
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Required(field)
            | ValidationError::TooLong(field, _)
            | ValidationError::SuspiciousContent(field)
            | ValidationError::Undecodable(field) => field,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Required(field) => write!(f, "{} is required", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains invalid characters", field)
            }
            ValidationError::Undecodable(field) => write!(f, "{} could not be decoded", field),
        }
    }
}

impl StdError for ValidationError {}

/// Store operation errors
#[derive(Debug)]
pub enum DatabaseError {
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionPool(err.to_string())
            }
            sqlx::Error::Database(_) | sqlx::Error::ColumnDecode { .. } => {
                DatabaseError::QueryExecution(err.to_string())
            }
            _ => DatabaseError::UnexpectedError(err.to_string()),
        }
    }
}

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    TokenExpired,
    TokenInvalid,
    MissingToken,
    SigningKeyUnavailable,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Login failed, wrong username or password!"),
            AuthError::TokenExpired => write!(f, "Token has expired!"),
            AuthError::TokenInvalid => write!(f, "Invalid token!"),
            AuthError::MissingToken => write!(f, "Missing authentication token!"),
            AuthError::SigningKeyUnavailable => write!(f, "Token signing key is unavailable"),
        }
    }
}

impl StdError for AuthError {}

/// Lookups that came back empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    Token,
    User,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundError::Token => write!(f, "Token doesn't exist!"),
            NotFoundError::User => write!(f, "User not found!"),
        }
    }
}

impl StdError for NotFoundError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppErrorKind {
    Validation(Vec<ValidationError>),
    Auth(AuthError),
    NotFound(NotFoundError),
    Database(DatabaseError),
    Internal(String),
}

/// An `AppErrorKind` together with the source location that raised it.
///
/// Every constructor is `#[track_caller]`, so `?` and `AppError::from` record
/// the line of the failing step.
#[derive(Debug)]
pub struct AppError {
    kind: AppErrorKind,
    location: &'static Location<'static>,
}

impl AppError {
    #[track_caller]
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Internal(message.into()))
    }

    pub fn kind(&self) -> &AppErrorKind {
        &self.kind
    }

    /// Where the error was raised
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::Auth(AuthError::SigningKeyUnavailable) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppErrorKind::Auth(_) => StatusCode::UNAUTHORIZED,
            AppErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            AppErrorKind::Database(_) | AppErrorKind::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client. Store and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Validation(_) => "Validation error!".to_string(),
            AppErrorKind::Auth(AuthError::SigningKeyUnavailable) => {
                "Something went wrong!".to_string()
            }
            AppErrorKind::Auth(e) => e.to_string(),
            AppErrorKind::NotFound(e) => e.to_string(),
            AppErrorKind::Database(_) | AppErrorKind::Internal(_) => {
                "Something went wrong!".to_string()
            }
        }
    }

    /// Field name to message, empty unless this is a validation failure
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match &self.kind {
            AppErrorKind::Validation(errors) => errors
                .iter()
                .map(|e| (e.field().to_string(), e.to_string()))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    /// Expected errors are client mistakes; everything else is ours.
    pub fn is_expected(&self) -> bool {
        !self.status_code().is_server_error()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Validation(errors) => {
                let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "Validation error: {}", joined.join(", "))
            }
            AppErrorKind::Auth(e) => write!(f, "{}", e),
            AppErrorKind::NotFound(e) => write!(f, "{}", e),
            AppErrorKind::Database(e) => write!(f, "{}", e),
            AppErrorKind::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            AppErrorKind::Auth(e) => Some(e),
            AppErrorKind::NotFound(e) => Some(e),
            AppErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    #[track_caller]
    fn from(err: ValidationError) -> Self {
        AppError::new(AppErrorKind::Validation(vec![err]))
    }
}

impl From<Vec<ValidationError>> for AppError {
    #[track_caller]
    fn from(errors: Vec<ValidationError>) -> Self {
        AppError::new(AppErrorKind::Validation(errors))
    }
}

impl From<AuthError> for AppError {
    #[track_caller]
    fn from(err: AuthError) -> Self {
        AppError::new(AppErrorKind::Auth(err))
    }
}

impl From<NotFoundError> for AppError {
    #[track_caller]
    fn from(err: NotFoundError) -> Self {
        AppError::new(AppErrorKind::NotFound(err))
    }
}

impl From<DatabaseError> for AppError {
    #[track_caller]
    fn from(err: DatabaseError) -> Self {
        AppError::new(AppErrorKind::Database(err))
    }
}

impl From<sqlx::Error> for AppError {
    #[track_caller]
    fn from(err: sqlx::Error) -> Self {
        AppError::new(AppErrorKind::Database(err.into()))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error envelope returned to clients: `{status, message, errors}`
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
    pub errors: BTreeMap<String, String>,
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self) -> (StatusCode, ErrorResponse);
    fn log_error(&self, context: &RequestContext);
}

impl ErrorHandler for AppError {
    fn error_response(&self) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let body = ErrorResponse {
            status: status.as_u16(),
            message: self.public_message(),
            errors: self.field_errors(),
        };
        (status, body)
    }

    fn log_error(&self, context: &RequestContext) {
        if self.is_expected() {
            tracing::warn!(
                request_id = %context.request_id,
                operation = %context.operation,
                path = %context.path,
                error = %self,
                "Request rejected"
            );
        } else {
            tracing::error!(
                request_id = %context.request_id,
                operation = %context.operation,
                path = %context.path,
                error = %self,
                "Request failed"
            );
        }
    }
}

/// Fallback for errors raised outside the audited handler boundary
/// (extractors, middleware).
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, body) = <Self as ErrorHandler>::error_response(self);
        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }
}

// ============================================================================
// 4. REQUEST CONTEXT
// ============================================================================

/// Per-request context handed explicitly to every lifecycle call
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub operation: String,
    pub path: String,
}

impl RequestContext {
    pub fn new(operation: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            path: path.into(),
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = request_id;
        self
    }
}
