//! Integration tests for the credential flows against PostgreSQL.
//!
//! These exercise the `Pg*` repository implementations end to end:
//! registration, login, token issue/consume atomicity, and session
//! revocation. They need a reachable database (see `migrations/`) and are
//! ignored by default.

use authcore::auth::{AuthError, AuthManager, AuthService, RegisterRequest, TokenKind, TokenManager};
use authcore::db::{
    Database, DatabaseConfig, PgSessionRepository, PgTokenRepository, PgUserRepository,
    UserRepository,
};
use authcore::notify::RecordingDispatcher;
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;

/// Helper to create a test database pool
async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/authcore_test".to_string());

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.pool().clone()
}

struct PgStack {
    users: Arc<PgUserRepository>,
    sessions: Arc<AuthManager>,
    tokens: Arc<TokenManager>,
    auth: AuthService,
    dispatcher: Arc<RecordingDispatcher>,
    pool: PgPool,
}

async fn setup_stack() -> PgStack {
    let pool = setup_test_db().await;
    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let session_repo = Arc::new(PgSessionRepository::new(pool.clone()));
    let token_repo = Arc::new(PgTokenRepository::new(pool.clone()));

    let sessions = Arc::new(AuthManager::new(
        users.clone(),
        session_repo,
        "pg_test_pepper".to_string(),
        "pg_test_jwt_secret_32_characters_ok".to_string(),
    ));
    let tokens = Arc::new(TokenManager::new(token_repo));
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let auth = AuthService::new(
        users.clone(),
        sessions.clone(),
        tokens.clone(),
        dispatcher.clone(),
        "https://app.example.com".to_string(),
    );

    PgStack {
        users,
        sessions,
        tokens,
        auth,
        dispatcher,
        pool,
    }
}

/// Remove a test user and its dependent rows (cascade handles the rest).
async fn cleanup_user(pool: &PgPool, email: &str) {
    let _ = sqlx::query("DELETE FROM users WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await;
}

fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: "SecurePass123!".to_string(),
        password_confirm: "SecurePass123!".to_string(),
        first_name: "Pg".to_string(),
        last_name: "Test".to_string(),
    }
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_register_and_login_roundtrip() {
    let stack = setup_stack().await;
    let email = "pg_register@example.com";
    cleanup_user(&stack.pool, email).await;

    let (user, tokens) = stack
        .auth
        .register(register_request(email))
        .await
        .expect("Registration should succeed");
    assert!(user.id > 0);
    assert!(!user.email_verified);
    assert!(stack.sessions.verify_access_token(&tokens.access_token).is_ok());

    let (logged_in, _) = stack
        .sessions
        .login(email, "SecurePass123!", Some("127.0.0.1"))
        .await
        .expect("Login should succeed");
    assert_eq!(logged_in.id, user.id);

    cleanup_user(&stack.pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_duplicate_email_conflicts() {
    let stack = setup_stack().await;
    let email = "pg_duplicate@example.com";
    cleanup_user(&stack.pool, email).await;

    stack.auth.register(register_request(email)).await.unwrap();
    let result = stack.auth.register(register_request(email)).await;
    assert!(matches!(result, Err(AuthError::EmailTaken)));

    cleanup_user(&stack.pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_issue_invalidates_prior_and_consume_is_single_use() {
    let stack = setup_stack().await;
    let email = "pg_tokens@example.com";
    cleanup_user(&stack.pool, email).await;

    let (user, _) = stack.auth.register(register_request(email)).await.unwrap();

    let first = stack.tokens.issue(user.id, TokenKind::PasswordReset).await.unwrap();
    let second = stack.tokens.issue(user.id, TokenKind::PasswordReset).await.unwrap();

    assert!(matches!(
        stack.tokens.consume(&first.secret, TokenKind::PasswordReset).await,
        Err(AuthError::InvalidOrExpiredToken)
    ));
    assert_eq!(
        stack
            .tokens
            .consume(&second.secret, TokenKind::PasswordReset)
            .await
            .unwrap(),
        user.id
    );
    assert!(matches!(
        stack.tokens.consume(&second.secret, TokenKind::PasswordReset).await,
        Err(AuthError::InvalidOrExpiredToken)
    ));

    cleanup_user(&stack.pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_concurrent_consume_has_one_winner() {
    let stack = setup_stack().await;
    let email = "pg_race@example.com";
    cleanup_user(&stack.pool, email).await;

    let (user, _) = stack.auth.register(register_request(email)).await.unwrap();
    let token = stack.tokens.issue(user.id, TokenKind::EmailVerification).await.unwrap();

    let mut join_set = tokio::task::JoinSet::new();
    for _ in 0..10 {
        let tokens = stack.tokens.clone();
        let secret = token.secret.clone();
        join_set.spawn(async move { tokens.consume(&secret, TokenKind::EmailVerification).await });
    }

    let mut successes = 0;
    while let Some(result) = join_set.join_next().await {
        if result.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "the conditional update admits exactly one winner");

    cleanup_user(&stack.pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_full_reset_flow_against_postgres() {
    let stack = setup_stack().await;
    let email = "pg_reset@example.com";
    cleanup_user(&stack.pool, email).await;

    stack.auth.register(register_request(email)).await.unwrap();
    stack.auth.request_password_reset(email).await.unwrap();

    let secret = stack
        .dispatcher
        .sent()
        .iter()
        .rev()
        .find(|m| m.kind == authcore::notify::MessageKind::PasswordReset)
        .unwrap()
        .context
        .action_url
        .split("token=")
        .nth(1)
        .unwrap()
        .to_string();

    stack
        .auth
        .confirm_password_reset(&secret, "RotatedPass1!", "RotatedPass1!")
        .await
        .expect("Reset should succeed");

    assert!(stack.sessions.login(email, "SecurePass123!", None).await.is_err());
    assert!(stack.sessions.login(email, "RotatedPass1!", None).await.is_ok());

    cleanup_user(&stack.pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_logout_then_refresh_fails() {
    let stack = setup_stack().await;
    let email = "pg_logout@example.com";
    cleanup_user(&stack.pool, email).await;

    let (user, tokens) = stack.auth.register(register_request(email)).await.unwrap();

    stack
        .sessions
        .logout(user.id, &tokens.refresh_token)
        .await
        .expect("Logout should succeed");
    assert!(matches!(
        stack.sessions.refresh(&tokens.refresh_token).await,
        Err(AuthError::AuthenticationFailed)
    ));

    cleanup_user(&stack.pool, email).await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_cleanup_sweep_deletes_only_expired_rows() {
    let stack = setup_stack().await;
    let email = "pg_sweep@example.com";
    cleanup_user(&stack.pool, email).await;

    let (user, _) = stack.auth.register(register_request(email)).await.unwrap();
    let live = stack.tokens.issue(user.id, TokenKind::PasswordReset).await.unwrap();

    // Backdate a token into expiry through plain SQL.
    sqlx::query(
        "UPDATE auth_tokens SET expires_at = NOW() - INTERVAL '1 hour'
         WHERE user_id = $1 AND kind = 'email_verification'",
    )
    .bind(user.id)
    .execute(&stack.pool)
    .await
    .unwrap();

    stack.tokens.cleanup_expired().await.unwrap();

    // The live reset token survived the sweep.
    assert_eq!(
        stack
            .tokens
            .consume(&live.secret, TokenKind::PasswordReset)
            .await
            .unwrap(),
        user.id
    );

    let _ = stack.users.find_by_id(user.id).await.unwrap();
    cleanup_user(&stack.pool, email).await;
}
