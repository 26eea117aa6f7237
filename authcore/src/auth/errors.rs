//! Authentication error types.

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Authentication errors
///
/// Security-sensitive lookup failures collapse to a generic variant: a
/// caller cannot tell "no such user" from "wrong password", nor "token
/// never existed" from "expired" or "already used".
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Generic credential failure (unknown email, wrong password, inactive
    /// account, bad refresh token)
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Generic single-use token failure (absent, wrong kind, used, expired)
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// Email already registered
    #[error("A user with this email already exists")]
    EmailTaken,

    /// Email already verified (authenticated resend endpoint only)
    #[error("Email already verified")]
    AlreadyVerified,

    /// Too many attempts for a rate-limited endpoint
    #[error("Too many attempts, please try again later")]
    RateLimited,

    /// Field-level validation failures, accumulated across all fields
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// JWT token error
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database and JWT errors are sanitized so internal structure is never
    /// exposed to a caller.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) => "Internal server error".to_string(),
            AuthError::JwtError(_) => "Authentication failed".to_string(),
            AuthError::HashingFailed => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
