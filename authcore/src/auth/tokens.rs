//! Single-use token issuance and validation.
//!
//! Tokens are opaque high-entropy secrets bound to one user and one
//! [`TokenKind`]. Issuing a new token invalidates every unused token of the
//! same kind for that user, so at most one is ever live; consuming one is a
//! compare-and-set, so it succeeds at most once no matter how many callers
//! race on it.

use chrono::Utc;
use log::debug;
use rand::RngCore;
use std::sync::Arc;

use super::errors::{AuthError, AuthResult};
use super::models::{Token, TokenKind, UserId};
use crate::db::repository::TokenRepository;

/// Secret size in bytes (32 bytes = 256 bits of entropy)
const SECRET_BYTES: usize = 32;

/// Generate a token secret: 32 CSPRNG bytes, hex-encoded.
pub fn generate_secret() -> String {
    let mut buffer = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut buffer);
    hex::encode(buffer)
}

/// Issues, validates, and garbage-collects single-use tokens.
#[derive(Clone)]
pub struct TokenManager {
    tokens: Arc<dyn TokenRepository>,
}

impl TokenManager {
    pub fn new(tokens: Arc<dyn TokenRepository>) -> Self {
        Self { tokens }
    }

    /// Issue a fresh token for a user, invalidating any unused token of the
    /// same kind as part of the same store operation.
    ///
    /// The returned [`Token`] carries the plaintext secret for out-of-band
    /// delivery; the secret is never written to logs.
    ///
    /// # Errors
    ///
    /// Store failures propagate; an unknown `user_id` fails with the
    /// generic credential error.
    pub async fn issue(&self, user_id: UserId, kind: TokenKind) -> AuthResult<Token> {
        let secret = generate_secret();
        let issued_at = Utc::now();
        let expires_at = issued_at + kind.ttl();

        let token = self
            .tokens
            .issue_token(user_id, kind, &secret, issued_at, expires_at)
            .await?;

        debug!("issued {} token {} for user {}", kind, token.id, user_id);
        Ok(token)
    }

    /// Consume a token exactly once, returning the owning user.
    ///
    /// Absent, wrong-kind, already-used, and expired secrets are
    /// indistinguishable to the caller: all fail with
    /// [`AuthError::InvalidOrExpiredToken`]. A consumed or invalidated
    /// token never validates again.
    pub async fn consume(&self, secret: &str, kind: TokenKind) -> AuthResult<UserId> {
        match self.tokens.consume_token(secret, kind).await? {
            Some(user_id) => {
                debug!("consumed {} token for user {}", kind, user_id);
                Ok(user_id)
            }
            None => Err(AuthError::InvalidOrExpiredToken),
        }
    }

    /// Delete expired token rows. Validation already excludes expired rows,
    /// so the sweep can race with it safely.
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        let removed = self.tokens.delete_expired().await?;
        if removed > 0 {
            debug!("cleanup removed {removed} expired tokens");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::repository::UserRepository;
    use proptest::prelude::*;

    async fn setup() -> (Arc<MemoryStore>, TokenManager, UserId) {
        let store = MemoryStore::shared();
        let user = store
            .create_user("tokens@example.com", "hash", "", "")
            .await
            .expect("Failed to create user");
        let manager = TokenManager::new(store.clone());
        (store, manager, user.id)
    }

    #[test]
    fn test_secret_is_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_secrets_are_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_expiry_is_exactly_issued_plus_ttl() {
        let (_store, manager, user_id) = setup().await;

        for kind in [TokenKind::PasswordReset, TokenKind::EmailVerification] {
            let token = manager.issue(user_id, kind).await.unwrap();
            assert_eq!(token.expires_at, token.issued_at + kind.ttl());
        }
    }

    #[tokio::test]
    async fn test_second_issue_invalidates_first() {
        let (_store, manager, user_id) = setup().await;

        let first = manager.issue(user_id, TokenKind::PasswordReset).await.unwrap();
        let second = manager.issue(user_id, TokenKind::PasswordReset).await.unwrap();

        // The first token is unexpired but no longer consumable.
        let result = manager.consume(&first.secret, TokenKind::PasswordReset).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));

        // The replacement still works.
        let owner = manager
            .consume(&second.secret, TokenKind::PasswordReset)
            .await
            .unwrap();
        assert_eq!(owner, user_id);
    }

    #[tokio::test]
    async fn test_kinds_do_not_invalidate_each_other() {
        let (_store, manager, user_id) = setup().await;

        let verify = manager.issue(user_id, TokenKind::EmailVerification).await.unwrap();
        manager.issue(user_id, TokenKind::PasswordReset).await.unwrap();

        let owner = manager
            .consume(&verify.secret, TokenKind::EmailVerification)
            .await
            .unwrap();
        assert_eq!(owner, user_id);
    }

    #[tokio::test]
    async fn test_consume_at_most_once() {
        let (_store, manager, user_id) = setup().await;
        let token = manager.issue(user_id, TokenKind::EmailVerification).await.unwrap();

        assert!(
            manager
                .consume(&token.secret, TokenKind::EmailVerification)
                .await
                .is_ok()
        );
        let retry = manager.consume(&token.secret, TokenKind::EmailVerification).await;
        assert!(matches!(retry, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_unknown_secret_fails_uniformly() {
        let (_store, manager, _user_id) = setup().await;
        let result = manager.consume(&generate_secret(), TokenKind::PasswordReset).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn test_concurrent_consumers_get_one_success() {
        let (_store, manager, user_id) = setup().await;
        let token = manager.issue(user_id, TokenKind::PasswordReset).await.unwrap();

        let mut join_set = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let manager = manager.clone();
            let secret = token.secret.clone();
            join_set.spawn(async move { manager.consume(&secret, TokenKind::PasswordReset).await });
        }

        let mut successes = 0;
        while let Some(result) = join_set.join_next().await {
            if result.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1, "exactly one racing consumer may win");
    }

    proptest! {
        #[test]
        fn prop_secret_charset_is_lower_hex(_seed in 0u8..8) {
            let secret = generate_secret();
            prop_assert!(secret.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }
}
