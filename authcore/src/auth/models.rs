//! Authentication data models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ID type
pub type UserId = i64;

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub email_verified: bool,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Full name, falling back to the email when the profile is empty.
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

/// Purpose tag scoping a single-use token's validity context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    PasswordReset,
    EmailVerification,
}

impl TokenKind {
    /// Time-to-live for tokens of this kind.
    pub fn ttl(self) -> Duration {
        match self {
            TokenKind::PasswordReset => Duration::hours(24),
            TokenKind::EmailVerification => Duration::hours(72),
        }
    }

    /// Stable storage tag.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::PasswordReset => "password_reset",
            TokenKind::EmailVerification => "email_verification",
        }
    }

    /// Parse a storage tag back into a kind.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "password_reset" => Some(TokenKind::PasswordReset),
            "email_verification" => Some(TokenKind::EmailVerification),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-use, time-bounded secret bound to one user and one kind.
///
/// Lifecycle: issued, then exactly one of used (via validation),
/// invalidated (by the next issuance of the same kind), or expired.
/// No transition leaves any of those terminal states.
#[derive(Debug, Clone)]
pub struct Token {
    pub id: i64,
    pub user_id: UserId,
    pub kind: TokenKind,
    pub secret: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Whether the token is still consumable at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// Store-tracked refresh session. The row id is the opaque refresh token.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

/// Capability interface for ownership checks.
///
/// Permission logic asks the entity for its owner instead of probing for
/// the presence of user-reference fields.
pub trait Owned {
    fn owner_id(&self) -> UserId;
}

impl Owned for Token {
    fn owner_id(&self) -> UserId {
        self.user_id
    }
}

impl Owned for Session {
    fn owner_id(&self) -> UserId {
        self.user_id
    }
}

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Password reset request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Password reset confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// Session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// JWT claims for access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: UserId,
    pub email: String,
    pub email_verified: bool,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}
