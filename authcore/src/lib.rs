//! # Authcore
//!
//! Credential and token lifecycle library: issuance, validation, single-use
//! enforcement, expiry, and revocation of the security tokens behind
//! password reset, email verification, and session refresh, plus the
//! anti-enumeration and rate-limiting policies that protect those flows.
//!
//! ## Core Modules
//!
//! - [`auth`]: users, single-use tokens, sessions, and the flows composing them
//! - [`db`]: store ports with PostgreSQL and in-memory implementations
//! - [`notify`]: outbound notification port for token delivery
//! - [`security`]: request rate limiting for sensitive endpoints
//!
//! ## Example
//!
//! ```no_run
//! use authcore::auth::{AuthManager, AuthService, TokenManager};
//! use authcore::db::memory::MemoryStore;
//! use authcore::notify::LogDispatcher;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::shared();
//!     let sessions = Arc::new(AuthManager::new(
//!         store.clone(),
//!         store.clone(),
//!         "secret_pepper".to_string(),
//!         "jwt_signing_secret_at_least_32_chars".to_string(),
//!     ));
//!     let tokens = Arc::new(TokenManager::new(store.clone()));
//!     let auth = AuthService::new(
//!         store,
//!         sessions,
//!         tokens,
//!         Arc::new(LogDispatcher),
//!         "https://app.example.com".to_string(),
//!     );
//!
//!     auth.request_password_reset("someone@example.com").await?;
//!     Ok(())
//! }
//! ```

/// Users, tokens, sessions, and the auth flows composing them.
pub mod auth;
pub use auth::{AuthError, AuthManager, AuthResult, AuthService, TokenManager};

/// Store ports and implementations.
pub mod db;
pub use db::{Database, DatabaseConfig};

/// Outbound notification port.
pub mod notify;

/// Rate limiting for sensitive endpoints.
pub mod security;
pub use security::RateLimiter;
