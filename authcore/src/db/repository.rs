//! Repository trait definitions for testability and dependency injection.
//!
//! The credential store is consumed through these ports. PostgreSQL
//! implementations live here; the in-memory implementation used by tests
//! and local runs lives in [`super::memory`].
//!
//! The atomicity contracts callers rely on:
//! - [`TokenRepository::issue_token`] invalidates every unused token of the
//!   same (user, kind) and inserts the replacement as one unit, serialized
//!   against concurrent issuance for the same user.
//! - [`TokenRepository::consume_token`] is a single compare-and-set: two
//!   racing consumers of one secret see exactly one success.
//! - [`SessionRepository::revoke_session`] only flips un-revoked rows and
//!   reports whether it did, so revocation is observable exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::errors::{AuthError, AuthResult};
use crate::auth::models::{Session, Token, TokenKind, User, UserId};

/// Trait for user store operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user. The email must already be normalized.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
    ) -> AuthResult<User>;

    /// Find user by normalized email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Replace a user's password hash
    async fn update_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()>;

    /// Mark a user's email as verified
    async fn set_email_verified(&self, user_id: UserId) -> AuthResult<()>;

    /// Record the source address of the latest successful login
    async fn update_last_login(&self, user_id: UserId, ip: Option<&str>) -> AuthResult<()>;

    /// Check that the store is reachable
    async fn health_check(&self) -> AuthResult<()>;
}

/// Trait for refresh-session store operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session
    async fn create_session(&self, session: &Session) -> AuthResult<()>;

    /// Find a session by its opaque id
    async fn find_session(&self, id: Uuid) -> AuthResult<Option<Session>>;

    /// Revoke a session. Returns `false` when the id is unknown or the
    /// session was already revoked.
    async fn revoke_session(&self, id: Uuid) -> AuthResult<bool>;

    /// Revoke every session belonging to a user, returning how many flipped
    async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64>;
}

/// Trait for single-use token store operations
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Invalidate all unused tokens of (`user_id`, `kind`) and insert the
    /// replacement, as one atomic unit.
    async fn issue_token(
        &self,
        user_id: UserId,
        kind: TokenKind,
        secret: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Token>;

    /// Atomically mark the matching live token used and return its owner.
    /// `None` covers every failure shape: absent, wrong kind, already used,
    /// or expired.
    async fn consume_token(&self, secret: &str, kind: TokenKind) -> AuthResult<Option<UserId>>;

    /// Garbage-collect expired token rows. Purely a cleanup: expired tokens
    /// already fail consumption whether or not they are deleted.
    async fn delete_expired(&self) -> AuthResult<u64>;
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_active: row.get("is_active"),
        is_admin: row.get("is_admin"),
        email_verified: row.get("email_verified"),
        last_login_ip: row.get("last_login_ip"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, is_active, is_admin,
                            email_verified, last_login_ip, created_at, updated_at";

/// PostgreSQL implementation of `UserRepository`
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
    ) -> AuthResult<User> {
        let query = format!(
            "INSERT INTO users (email, password_hash, first_name, last_name)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        );

        match sqlx::query(&query)
            .bind(email)
            .bind(password_hash)
            .bind(first_name)
            .bind(last_name)
            .fetch_one(&self.pool)
            .await
        {
            Ok(row) => Ok(user_from_row(&row)),
            // Concurrent registration of the same email loses the race at
            // the unique index rather than at the pre-check.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(AuthError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| user_from_row(&r)))
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| user_from_row(&r)))
    }

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_email_verified(&self, user_id: UserId) -> AuthResult<()> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_last_login(&self, user_id: UserId, ip: Option<&str>) -> AuthResult<()> {
        sqlx::query("UPDATE users SET last_login_ip = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(ip)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> AuthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// PostgreSQL implementation of `SessionRepository`
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create_session(&self, session: &Session) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, issued_at, expires_at, revoked)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.issued_at.naive_utc())
        .bind(session.expires_at.naive_utc())
        .bind(session.revoked)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> AuthResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, user_id, issued_at, expires_at, revoked FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Session {
            id: r.get("id"),
            user_id: r.get("user_id"),
            issued_at: r.get::<chrono::NaiveDateTime, _>("issued_at").and_utc(),
            expires_at: r.get::<chrono::NaiveDateTime, _>("expires_at").and_utc(),
            revoked: r.get("revoked"),
        }))
    }

    async fn revoke_session(&self, id: Uuid) -> AuthResult<bool> {
        let result = sqlx::query("UPDATE sessions SET revoked = TRUE WHERE id = $1 AND NOT revoked")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> AuthResult<u64> {
        let result =
            sqlx::query("UPDATE sessions SET revoked = TRUE WHERE user_id = $1 AND NOT revoked")
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

/// PostgreSQL implementation of `TokenRepository`
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn issue_token(
        &self,
        user_id: UserId,
        kind: TokenKind,
        secret: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<Token> {
        let mut tx = self.pool.begin().await?;

        // Locking the owner row serializes concurrent issuance for the same
        // (user, kind) and confirms the user exists before anything mutates.
        let owner = sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if owner.is_none() {
            return Err(AuthError::AuthenticationFailed);
        }

        sqlx::query(
            "UPDATE auth_tokens SET used_at = NOW()
             WHERE user_id = $1 AND kind = $2 AND used_at IS NULL",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "INSERT INTO auth_tokens (user_id, kind, secret, issued_at, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(secret)
        .bind(issued_at.naive_utc())
        .bind(expires_at.naive_utc())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Token {
            id: row.get("id"),
            user_id,
            kind,
            secret: secret.to_string(),
            issued_at,
            expires_at,
            used_at: None,
        })
    }

    async fn consume_token(&self, secret: &str, kind: TokenKind) -> AuthResult<Option<UserId>> {
        // One conditional update: racing consumers of the same secret get
        // exactly one row back between them.
        let row = sqlx::query(
            "UPDATE auth_tokens SET used_at = NOW()
             WHERE secret = $1 AND kind = $2 AND used_at IS NULL AND expires_at > NOW()
             RETURNING user_id",
        )
        .bind(secret)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("user_id")))
    }

    async fn delete_expired(&self) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
