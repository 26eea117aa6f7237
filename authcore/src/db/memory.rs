//! In-memory credential store.
//!
//! Implements all three repository ports behind a single mutex, which makes
//! every operation trivially atomic. Used by the test suites and by local
//! runs that don't want a PostgreSQL instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::auth::errors::{AuthError, AuthResult};
use crate::auth::models::{Session, Token, TokenKind, User, UserId};

use super::repository::{SessionRepository, TokenRepository, UserRepository};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    next_user_id: UserId,
    tokens: Vec<Token>,
    next_token_id: i64,
    sessions: HashMap<Uuid, Session>,
}

/// In-memory store implementing every repository port.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle suitable for handing to several managers at once.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of token records currently held, used or not.
    pub fn token_count(&self) -> usize {
        self.inner.lock().unwrap().tokens.len()
    }

    /// Flip a user's active flag, for exercising inactive-account paths.
    pub fn set_active(&self, user_id: UserId, active: bool) {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(&user_id) {
            user.is_active = active;
        }
    }

    /// Snapshot of a user's tokens of one kind, newest last.
    pub fn tokens_for(&self, user_id: UserId, kind: TokenKind) -> Vec<Token> {
        self.inner
            .lock()
            .unwrap()
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
    ) -> AuthResult<User> {
        let mut inner = self.inner.lock().unwrap();

        if inner.users.values().any(|u| u.email == email) {
            return Err(AuthError::EmailTaken);
        }

        inner.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: inner.next_user_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            is_active: true,
            is_admin: false,
            email_verified: false,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.inner.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()> {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_email_verified(&self, user_id: UserId) -> AuthResult<()> {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(&user_id) {
            user.email_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_last_login(&self, user_id: UserId, ip: Option<&str>) -> AuthResult<()> {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(&user_id) {
            user.last_login_ip = ip.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn health_check(&self) -> AuthResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create_session(&self, session: &Session) -> AuthResult<()> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> AuthResult<Option<Session>> {
        Ok(self.inner.lock().unwrap().sessions.get(&id).cloned())
    }

    async fn revoke_session(&self, id: Uuid) -> AuthResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get_mut(&id) {
            Some(session) if !session.revoked => {
                session.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut flipped = 0;
        for session in inner.sessions.values_mut() {
            if session.user_id == user_id && !session.revoked {
                session.revoked = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn issue_token(
        &self,
        user_id: UserId,
        kind: TokenKind,
        secret: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Token> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.users.contains_key(&user_id) {
            return Err(AuthError::AuthenticationFailed);
        }

        // Invalidate-then-insert under one lock: the single-live-token
        // invariant holds even against concurrent issuance.
        let now = Utc::now();
        for token in &mut inner.tokens {
            if token.user_id == user_id && token.kind == kind && token.used_at.is_none() {
                token.used_at = Some(now);
            }
        }

        inner.next_token_id += 1;
        let token = Token {
            id: inner.next_token_id,
            user_id,
            kind,
            secret: secret.to_string(),
            issued_at,
            expires_at,
            used_at: None,
        };
        inner.tokens.push(token.clone());
        Ok(token)
    }

    async fn consume_token(&self, secret: &str, kind: TokenKind) -> AuthResult<Option<UserId>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        // Secret equality uses a constant-time comparison.
        let found = inner.tokens.iter_mut().find(|t| {
            t.kind == kind
                && t.used_at.is_none()
                && t.expires_at > now
                && bool::from(t.secret.as_bytes().ct_eq(secret.as_bytes()))
        });

        match found {
            Some(token) => {
                token.used_at = Some(now);
                Ok(Some(token.user_id))
            }
            None => Ok(None),
        }
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let before = inner.tokens.len();
        inner.tokens.retain(|t| t.expires_at >= now);
        Ok((before - inner.tokens.len()) as u64)
    }
}
