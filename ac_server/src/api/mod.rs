//! HTTP API for the credential service.
//!
//! # Architecture
//!
//! - **Axum**: async web framework
//! - **Tower**: middleware for CORS, request IDs, authentication
//! - **JWT**: bearer access tokens; refresh sessions tracked in the store
//!
//! # Endpoints
//!
//! ## Public
//! - `GET  /health` - Store health and version
//! - `POST /api/v1/auth/register` - Register (rate-limited)
//! - `POST /api/v1/auth/login` - Login (rate-limited)
//! - `POST /api/v1/auth/refresh` - New access token from a refresh id
//! - `POST /api/v1/auth/password/reset` - Request reset link (rate-limited, always 200)
//! - `POST /api/v1/auth/password/reset/confirm` - Set new password with token
//! - `POST /api/v1/auth/email/verify` - Verify email with token
//!
//! ## Protected (bearer token)
//! - `POST /api/v1/auth/logout` - Revoke one of the caller's refresh sessions
//! - `POST /api/v1/auth/email/resend` - Re-send the verification link

pub mod auth;
pub mod middleware;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use authcore::auth::{AuthManager, AuthService};
use authcore::security::RateLimiter;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request (cheap: all fields are `Arc`s).
#[derive(Clone)]
pub struct AppState {
    /// Account flows: registration, reset, verification
    pub auth: Arc<AuthService>,
    /// Session lifecycle and access-token verification
    pub sessions: Arc<AuthManager>,
    /// Keyed counters guarding the sensitive endpoints
    pub limiter: Arc<RateLimiter>,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let root_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", create_v1_router(state.clone()))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API v1 routes, split into public and bearer-protected sets.
fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/password/reset", post(auth::request_password_reset))
        .route(
            "/auth/password/reset/confirm",
            post(auth::confirm_password_reset),
        )
        .route("/auth/email/verify", post(auth::verify_email));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/email/resend", post(auth::resend_verification))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the credential store answers, `503` otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state.auth.store_healthy().await;

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
