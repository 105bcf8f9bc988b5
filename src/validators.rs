/// Request field validators
///
/// Every field is required. Length caps keep oversized payloads away from
/// bcrypt and the JWT decoder.

use crate::error::ValidationError;

const MAX_USERNAME_LENGTH: usize = 255;
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_TOKEN_LENGTH: usize = 4096;

/// Validates a username. Blank input counts as missing; anything else is
/// looked up exactly as sent.
pub fn validate_username(username: Option<&str>) -> Result<String, ValidationError> {
    let username = required("username", username)?;

    if username.trim().is_empty() {
        return Err(ValidationError::Required("username"));
    }

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username", MAX_USERNAME_LENGTH));
    }

    if username.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("username"));
    }

    Ok(username.to_string())
}

/// Validates a password. The value is passed through untouched.
pub fn validate_password(password: Option<&str>) -> Result<String, ValidationError> {
    let password = required("password", password)?;

    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    Ok(password.to_string())
}

/// Validates a refresh token field.
pub fn validate_token(token: Option<&str>) -> Result<String, ValidationError> {
    let trimmed = required("token", token)?.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required("token"));
    }

    if trimmed.len() > MAX_TOKEN_LENGTH {
        return Err(ValidationError::TooLong("token", MAX_TOKEN_LENGTH));
    }

    Ok(trimmed.to_string())
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::Required(field)),
    }
}
