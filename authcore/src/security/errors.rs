//! Error types for the security module

use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimiterResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// No configuration registered for the endpoint
    #[error("Invalid endpoint configuration: {0}")]
    InvalidEndpoint(String),
}
