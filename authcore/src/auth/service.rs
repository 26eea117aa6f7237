//! Account flows composing the token, session, and notification pieces:
//! registration, password reset, and email verification.
//!
//! This is where the anti-enumeration policy lives. Endpoints reachable
//! without authentication never reveal whether an email belongs to an
//! account: password-reset requests always succeed, and every token failure
//! collapses to one generic error.

use log::{debug, warn};
use std::sync::Arc;

use super::errors::{AuthError, AuthResult};
use super::manager::AuthManager;
use super::models::{RegisterRequest, SessionTokens, TokenKind, User, UserId};
use super::tokens::{TokenManager, generate_secret};
use super::validation::{normalize_email, validate_new_password, validate_registration};
use crate::db::repository::UserRepository;
use crate::notify::{MessageContext, MessageKind, NotificationDispatcher};

/// Account flow orchestrator.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<AuthManager>,
    tokens: Arc<TokenManager>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    frontend_url: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<AuthManager>,
        tokens: Arc<TokenManager>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        frontend_url: String,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            dispatcher,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    /// Register a new account, send its verification link, and open its
    /// first session.
    ///
    /// Field validation accumulates every problem before returning, so the
    /// caller sees all of them at once.
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<(User, SessionTokens)> {
        validate_registration(&request).map_err(AuthError::Validation)?;

        let email = normalize_email(&request.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.sessions.hash_password(&request.password)?;
        let user = self
            .users
            .create_user(
                &email,
                &password_hash,
                request.first_name.trim(),
                request.last_name.trim(),
            )
            .await?;

        self.send_token_message(&user, TokenKind::EmailVerification)
            .await?;

        let tokens = self.sessions.establish(&user).await?;
        Ok((user, tokens))
    }

    /// Request a password reset link.
    ///
    /// Always succeeds. When the email maps to an active account a token is
    /// issued and dispatched; otherwise equivalent-shaped work runs and the
    /// response is identical, so the caller learns nothing about which
    /// emails exist.
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);

        match self.users.find_by_email(&email).await? {
            Some(user) if user.is_active => {
                self.send_token_message(&user, TokenKind::PasswordReset)
                    .await?;
            }
            _ => {
                // Keep the no-account path shaped like the real one.
                let _ = generate_secret();
                debug!("password reset requested for unresolvable email");
            }
        }

        Ok(())
    }

    /// Set a new password using a reset token.
    ///
    /// The token is consumed on success and can never be replayed.
    pub async fn confirm_password_reset(
        &self,
        secret: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> AuthResult<()> {
        validate_new_password(new_password, new_password_confirm).map_err(AuthError::Validation)?;

        let user_id = self.tokens.consume(secret, TokenKind::PasswordReset).await?;
        let password_hash = self.sessions.hash_password(new_password)?;
        self.users.update_password(user_id, &password_hash).await?;

        debug!("password reset completed for user {user_id}");
        Ok(())
    }

    /// Mark an email verified using a verification token.
    pub async fn verify_email(&self, secret: &str) -> AuthResult<()> {
        let user_id = self
            .tokens
            .consume(secret, TokenKind::EmailVerification)
            .await?;
        self.users.set_email_verified(user_id).await?;

        debug!("email verified for user {user_id}");
        Ok(())
    }

    /// Re-send the verification link for an authenticated user.
    ///
    /// Authenticated context, so the already-verified case may be a
    /// distinct error without enumeration risk. Re-issuing invalidates any
    /// prior unused verification token.
    pub async fn resend_verification(&self, user_id: UserId) -> AuthResult<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::AuthenticationFailed)?;

        if user.email_verified {
            return Err(AuthError::AlreadyVerified);
        }

        self.send_token_message(&user, TokenKind::EmailVerification)
            .await
    }

    /// Check that the credential store is reachable.
    pub async fn store_healthy(&self) -> bool {
        self.users.health_check().await.is_ok()
    }

    /// Issue a token of `kind` and hand it to the dispatcher.
    ///
    /// Store failures propagate; delivery failures are logged and dropped.
    /// The token stays persisted, undelivered.
    async fn send_token_message(&self, user: &User, kind: TokenKind) -> AuthResult<()> {
        let token = self.tokens.issue(user.id, kind).await?;

        let (message_kind, path) = match kind {
            TokenKind::PasswordReset => (MessageKind::PasswordReset, "reset-password"),
            TokenKind::EmailVerification => (MessageKind::EmailVerification, "verify-email"),
        };
        let context = MessageContext {
            action_url: format!("{}/{}?token={}", self.frontend_url, path, token.secret),
            expiry_hours: kind.ttl().num_hours(),
        };

        if let Err(e) = self
            .dispatcher
            .send(message_kind, &user.email, &context)
            .await
        {
            warn!("{} delivery failed for user {}: {}", message_kind, user.id, e);
        }

        Ok(())
    }
}
