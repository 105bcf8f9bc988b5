/// Authentication module
///
/// Handles JWT issuing/validation, password verification and the refresh
/// token lifecycle (login, renew, logout).

mod claims;
mod jwt;
mod lifecycle;
mod password;

pub use claims::{AccessClaims, RefreshClaims};
pub use jwt::{issue_access_token, issue_refresh_token, validate_access_token, validate_refresh_token};
pub use lifecycle::{TokenLifecycle, TokenPair};
pub use password::{hash_password, verify_password};
