//! Session management: login, refresh, logout, and access-token handling.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::{AuthError, AuthResult};
use super::models::{AccessTokenClaims, Owned, Session, SessionTokens, User, UserId};
use super::validation::normalize_email;
use crate::db::repository::{SessionRepository, UserRepository};

/// Session manager
///
/// Access tokens are stateless signed claims checked only against signature
/// and expiry. Refresh tokens are store-tracked sessions whose `revoked`
/// flag never transitions back once set.
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    pepper: String,
    jwt_secret: String,
    access_token_duration: Duration,
    refresh_token_duration: Duration,
}

impl AuthManager {
    /// Create a new session manager with default token lifetimes
    /// (15-minute access tokens, 7-day refresh sessions).
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        pepper: String,
        jwt_secret: String,
    ) -> Self {
        Self {
            users,
            sessions,
            pepper,
            jwt_secret,
            access_token_duration: Duration::minutes(15),
            refresh_token_duration: Duration::days(7),
        }
    }

    /// Override token lifetimes.
    pub fn with_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_token_duration = access;
        self.refresh_token_duration = refresh;
        self
    }

    /// Authenticate a user and open a session.
    ///
    /// Unknown email, inactive account, and wrong password are
    /// indistinguishable to the caller: all fail with
    /// [`AuthError::AuthenticationFailed`]. Email verification is not a
    /// login precondition.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> AuthResult<(User, SessionTokens)> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::AuthenticationFailed);
        };
        if !user.is_active {
            return Err(AuthError::AuthenticationFailed);
        }

        // Expensive verification runs on a plain snapshot of the row; no
        // store lock is held across it.
        self.verify_password(password, &user.password_hash)?;

        let tokens = self.establish(&user).await?;
        self.users.update_last_login(user.id, ip).await?;

        info!("user {} logged in", user.id);
        Ok((user, tokens))
    }

    /// Open a session and mint an access token for an already-authenticated
    /// user (login and the post-registration auto-login share this path).
    pub async fn establish(&self, user: &User) -> AuthResult<SessionTokens> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: user.id,
            issued_at: now,
            expires_at: now + self.refresh_token_duration,
            revoked: false,
        };
        self.sessions.create_session(&session).await?;

        Ok(SessionTokens {
            access_token: self.generate_access_token(user)?,
            refresh_token: session.id.to_string(),
        })
    }

    /// Mint a new access token from a refresh session.
    ///
    /// Absent, revoked, or expired sessions fail with the generic
    /// credential error. The refresh token itself is not rotated.
    pub async fn refresh(&self, refresh_id: &str) -> AuthResult<String> {
        let id = Uuid::parse_str(refresh_id).map_err(|_| AuthError::AuthenticationFailed)?;

        let Some(session) = self.sessions.find_session(id).await? else {
            return Err(AuthError::AuthenticationFailed);
        };
        if session.revoked || session.expires_at <= Utc::now() {
            return Err(AuthError::AuthenticationFailed);
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::AuthenticationFailed)?;

        self.generate_access_token(&user)
    }

    /// Revoke one of the caller's refresh sessions.
    ///
    /// Unknown ids, already-revoked sessions, and sessions owned by someone
    /// else all produce the same failure; nothing distinguishes them.
    pub async fn logout(&self, caller: UserId, refresh_id: &str) -> AuthResult<()> {
        let id = Uuid::parse_str(refresh_id).map_err(|_| AuthError::InvalidOrExpiredToken)?;

        let Some(session) = self.sessions.find_session(id).await? else {
            return Err(AuthError::InvalidOrExpiredToken);
        };
        if session.owner_id() != caller {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        if self.sessions.revoke_session(id).await? {
            info!("user {} revoked session {}", caller, id);
            Ok(())
        } else {
            Err(AuthError::InvalidOrExpiredToken)
        }
    }

    /// Revoke every session a user holds, returning how many were live.
    pub async fn logout_all(&self, user_id: UserId) -> AuthResult<u64> {
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;
        info!("user {} revoked {} sessions", user_id, revoked);
        Ok(revoked)
    }

    /// Verify an access token's signature and expiry, returning its claims.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let token_data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }

    /// Hash a password with Argon2id + server-side pepper.
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        Ok(argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Verify a password against a stored hash.
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::AuthenticationFailed)?;
        let argon2 = Argon2::default();

        argon2
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::AuthenticationFailed)
    }

    fn generate_access_token(&self, user: &User) -> AuthResult<String> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user.id,
            email: user.email.clone(),
            email_verified: user.email_verified,
            is_admin: user.is_admin,
            exp: (now + self.access_token_duration).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }
}
