//! Credential and token lifecycle server.
//!
//! Wires the PostgreSQL-backed stores into the auth managers, mounts the
//! HTTP API, and runs the periodic expired-token cleanup sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use chrono::Duration as ChronoDuration;
use ctrlc::set_handler;
use pico_args::Arguments;
use tracing::{error, info};

use ac_server::api::{self, AppState};
use ac_server::config::ServerConfig;
use ac_server::{logging, metrics};
use authcore::auth::{AuthManager, AuthService, TokenManager};
use authcore::db::{Database, PgSessionRepository, PgTokenRepository, PgUserRepository};
use authcore::notify::LogDispatcher;
use authcore::security::RateLimiter;

const HELP: &str = "\
Run the credential and token lifecycle server

USAGE:
  ac_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               JWT signing secret (required)
  PASSWORD_PEPPER          Password hashing pepper (required)
  FRONTEND_URL             Base URL for reset/verification links
  METRICS_BIND             Optional Prometheus exporter address
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.value_from_str("--bind").ok();
    let db_url_override: Option<String> = pargs.value_from_str("--db-url").ok();

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override)?;
    config.validate()?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(Error::msg)?;
        info!("Metrics exporter listening on {}", metrics_bind);
    }

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    info!("Database connected successfully");

    let pool = db.pool().clone();
    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let session_repo = Arc::new(PgSessionRepository::new(pool.clone()));
    let token_repo = Arc::new(PgTokenRepository::new(pool));

    let sessions = Arc::new(
        AuthManager::new(
            users.clone(),
            session_repo,
            config.security.password_pepper.clone(),
            config.security.jwt_secret.clone(),
        )
        .with_ttls(
            ChronoDuration::minutes(config.tokens.access_ttl_mins),
            ChronoDuration::days(config.tokens.refresh_ttl_days),
        ),
    );
    let tokens = Arc::new(TokenManager::new(token_repo));
    let limiter = Arc::new(RateLimiter::new());
    let auth = Arc::new(AuthService::new(
        users,
        sessions.clone(),
        tokens.clone(),
        Arc::new(LogDispatcher),
        config.frontend_url.clone(),
    ));

    // Periodic garbage collection of expired token rows and stale
    // rate-limit windows. Races with request handling are safe: validation
    // already excludes expired rows.
    let sweep_tokens = tokens.clone();
    let sweep_limiter = limiter.clone();
    let sweep_interval = config.cleanup_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval));
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            match sweep_tokens.cleanup_expired().await {
                Ok(removed) => {
                    metrics::cleanup_removed_tokens(removed);
                    if removed > 0 {
                        info!("Cleanup sweep removed {} expired tokens", removed);
                    }
                }
                Err(e) => error!("Cleanup sweep failed: {}", e),
            }
            sweep_limiter.prune().await;
        }
    });

    let state = AppState {
        auth,
        sessions,
        limiter,
    };
    let app = api::create_router(state);

    info!("Starting HTTP server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
