//! Authentication API handlers.
//!
//! HTTP surface for the credential flows: registration, login, logout,
//! token refresh, password reset, and email verification. Handlers gate
//! the sensitive endpoints through the rate limiter, map domain errors to
//! status codes, and keep the uniform-response policy intact: a caller
//! cannot distinguish which account-lookup failure actually occurred.

use axum::{
    Json,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use authcore::auth::{
    AuthError, LoginRequest, PasswordResetConfirm, PasswordResetRequest, RegisterRequest, User,
    UserId,
};
use authcore::security::RateLimitResult;

use super::AppState;
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct VerifyEmailPayload {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshPayload {
    pub refresh: String,
}

/// Profile fields exposed to clients; the hash never leaves the store.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Map a domain error onto its HTTP shape.
///
/// Generic variants stay generic: the body carries `client_message()`, not
/// the underlying cause.
fn error_response(err: &AuthError) -> ApiError {
    let status = match err {
        AuthError::Validation(_)
        | AuthError::EmailTaken
        | AuthError::InvalidOrExpiredToken
        | AuthError::AlreadyVerified => StatusCode::BAD_REQUEST,
        AuthError::AuthenticationFailed | AuthError::JwtError(_) => StatusCode::UNAUTHORIZED,
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Database(_) | AuthError::HashingFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match err {
        AuthError::Validation(fields) => serde_json::json!({ "errors": fields }),
        _ => serde_json::json!({ "error": err.client_message() }),
    };

    (status, Json(body))
}

/// Source key for rate limiting: hashed client address.
///
/// Hashing keeps raw addresses out of the counter map and the logs.
fn source_key(headers: &HeaderMap) -> String {
    let ip = client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    let digest = Sha256::digest(ip.as_bytes());
    hex::encode(&digest[..8])
}

/// Client address as reported by the proxy chain.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Run the rate-limit gate for an endpoint, producing the 429 on rejection.
async fn rate_limit_gate(state: &AppState, endpoint: &str, headers: &HeaderMap) -> Result<(), ApiError> {
    let key = source_key(headers);
    let outcome = state
        .limiter
        .check_and_record(endpoint, &key)
        .await
        .map_err(|_| error_response(&AuthError::RateLimited))?;

    match outcome {
        RateLimitResult::Allowed { .. } => Ok(()),
        RateLimitResult::Rejected { retry_after } => {
            metrics::rate_limit_hits_total(endpoint);
            logging::log_security_event(
                "rate_limited",
                Some(&key),
                &format!("{endpoint} request rejected"),
            );
            Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": AuthError::RateLimited.client_message(),
                    "retry_after": retry_after,
                })),
            ))
        }
    }
}

/// Register a new account.
///
/// Returns `201 Created` with the profile and a token pair; the
/// verification link goes out by email. Field problems come back together
/// as a 400 with per-field detail; a duplicate email is a 400 on its own.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    rate_limit_gate(&state, "register", &headers).await?;

    match state.auth.register(payload).await {
        Ok((user, tokens)) => {
            metrics::registrations_total();
            Ok((
                StatusCode::CREATED,
                Json(AuthResponse {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    user: UserProfile::from(&user),
                }),
            ))
        }
        Err(e) => Err(error_response(&e)),
    }
}

/// Authenticate and open a session.
///
/// All credential failures are a uniform 401.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    rate_limit_gate(&state, "login", &headers).await?;

    let ip = client_ip(&headers);
    match state
        .sessions
        .login(&payload.email, &payload.password, ip.as_deref())
        .await
    {
        Ok((user, tokens)) => {
            metrics::login_attempts_total(true);
            Ok(Json(AuthResponse {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                user: UserProfile::from(&user),
            }))
        }
        Err(e) => {
            metrics::login_attempts_total(false);
            logging::log_security_event(
                "failed_login",
                Some(&source_key(&headers)),
                "Login rejected",
            );
            Err(error_response(&e))
        }
    }
}

/// Mint a new access token from a refresh id.
///
/// Unknown, revoked, and expired refresh ids all produce the same 401.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.sessions.refresh(&payload.refresh).await {
        Ok(access_token) => Ok(Json(serde_json::json!({ "access_token": access_token }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Revoke one of the caller's refresh sessions.
///
/// Unknown and already-revoked ids are a 400, distinct from success.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.sessions.logout(user_id, &payload.refresh).await {
        Ok(()) => Ok(Json(serde_json::json!({ "message": "Logged out successfully." }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Request a password reset link.
///
/// Responds identically whether or not the email maps to an account.
pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    rate_limit_gate(&state, "password_reset", &headers).await?;
    metrics::password_reset_requests_total();

    match state.auth.request_password_reset(&payload.email).await {
        Ok(()) => Ok(Json(serde_json::json!({
            "message": "If an account exists, a password reset email has been sent."
        }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Set a new password using a reset token.
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state
        .auth
        .confirm_password_reset(
            &payload.token,
            &payload.new_password,
            &payload.new_password_confirm,
        )
        .await
    {
        Ok(()) => Ok(Json(serde_json::json!({ "message": "Password reset successfully." }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Verify an email address using a verification token.
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.auth.verify_email(&payload.token).await {
        Ok(()) => Ok(Json(serde_json::json!({ "message": "Email verified successfully." }))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Re-send the verification link for the authenticated caller.
pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(user_id): Extension<UserId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.auth.resend_verification(user_id).await {
        Ok(()) => Ok(Json(serde_json::json!({ "message": "Verification email sent." }))),
        Err(e) => Err(error_response(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_key_is_stable_and_opaque() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());

        let key1 = source_key(&headers);
        let key2 = source_key(&headers);
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 16);
        assert!(!key1.contains("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));

        let empty = HeaderMap::new();
        assert_eq!(client_ip(&empty), None);
    }

    #[test]
    fn test_error_response_statuses() {
        let (status, _) = error_response(&AuthError::AuthenticationFailed);
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = error_response(&AuthError::InvalidOrExpiredToken);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = error_response(&AuthError::RateLimited);
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, body) = error_response(&AuthError::Database(sqlx::Error::PoolClosed));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["error"], "Internal server error");
    }

    #[test]
    fn test_validation_errors_serialize_per_field() {
        use authcore::auth::FieldError;

        let err = AuthError::Validation(vec![
            FieldError::new("email", "Enter a valid email address"),
            FieldError::new("password", "Too short"),
        ]);
        let (status, body) = error_response(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0["errors"].as_array().unwrap().len(), 2);
    }
}
