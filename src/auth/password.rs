/// Password Hashing and Verification
///
/// Stored hashes are bcrypt (`$2a$`, `$2b$` and `$2y$` prefixes all verify).

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Hash a password using bcrypt with the given cost
///
/// Users are provisioned out of band; provisioning tools and fixtures use
/// this to produce compatible hashes (`bcrypt::DEFAULT_COST` in production).
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost)
        .map_err(|e| AppError::internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns error if the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::internal(format!("Password verification failed: {}", e)))
}
