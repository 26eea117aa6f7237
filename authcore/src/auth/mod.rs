//! Authentication module providing user registration, login, session
//! management, and single-use token lifecycle.
//!
//! This module implements secure credential handling with:
//! - Argon2id password hashing with server-side pepper
//! - JWT access tokens (15-minute expiry, stateless)
//! - Store-tracked refresh sessions (7-day expiry, revocable)
//! - Single-use password-reset tokens (24-hour expiry)
//! - Single-use email-verification tokens (72-hour expiry)
//! - Uniform failure responses on the lookup paths an attacker could
//!   otherwise use to enumerate accounts or probe token state
//!
//! ## Example
//!
//! ```no_run
//! use authcore::auth::{AuthManager, TokenManager, TokenKind};
//! use authcore::db::memory::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::shared();
//!     let tokens = TokenManager::new(store.clone());
//!
//!     let issued = tokens.issue(1, TokenKind::PasswordReset).await?;
//!     let user_id = tokens.consume(&issued.secret, TokenKind::PasswordReset).await?;
//!     assert_eq!(user_id, 1);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod service;
pub mod tokens;
pub mod validation;

pub use errors::{AuthError, AuthResult, FieldError};
pub use manager::AuthManager;
pub use models::{
    AccessTokenClaims, LoginRequest, Owned, PasswordResetConfirm, PasswordResetRequest,
    RegisterRequest, Session, SessionTokens, Token, TokenKind, User, UserId,
};
pub use service::AuthService;
pub use tokens::TokenManager;
