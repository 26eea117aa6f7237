//! Structured logging configuration.
//!
//! Initializes tracing with env-filter control and provides the helper for
//! security-relevant events (failed logins, rate-limit rejections).

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging.
///
/// Log levels are controlled through `RUST_LOG`; the default keeps sqlx and
/// hyper chatter down.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a security event with structured fields.
///
/// Events carry the source key rather than a raw address, and never a
/// credential or token secret.
pub fn log_security_event(event_type: &str, source_key: Option<&str>, message: &str) {
    tracing::warn!(
        event_type = event_type,
        source_key = source_key,
        "SECURITY: {}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_security_event() {
        // Just ensure it doesn't panic
        log_security_event("failed_login", Some("ab12cd34"), "Invalid credentials");
        log_security_event("rate_limited", None, "Reset request rejected");
    }
}
