//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use authcore::db::DatabaseConfig;
use std::net::SocketAddr;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Token lifetime configuration
    pub tokens: TokenConfig,
    /// Base URL the action links in outbound messages point at
    pub frontend_url: String,
    /// Seconds between expired-token cleanup sweeps
    pub cleanup_interval_secs: u64,
    /// Optional Prometheus exporter bind address
    pub metrics_bind: Option<SocketAddr>,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
}

/// Session token lifetimes
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access token lifetime in minutes
    pub access_ttl_mins: i64,
    /// Refresh session lifetime in days
    pub refresh_ttl_days: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:8080"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| "postgres://postgres@localhost/authcore_db".to_string());

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
        };

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let password_pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        let security = SecurityConfig {
            jwt_secret,
            password_pepper,
        };

        let tokens = TokenConfig {
            access_ttl_mins: parse_env_or("ACCESS_TOKEN_TTL_MINS", 15),
            refresh_ttl_days: parse_env_or("REFRESH_TOKEN_TTL_DAYS", 7),
        };

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(ServerConfig {
            bind,
            database,
            security,
            tokens,
            frontend_url,
            cleanup_interval_secs: parse_env_or("TOKEN_CLEANUP_INTERVAL_SECS", 3600),
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.access_ttl_mins <= 0 {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_TTL_MINS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.tokens.refresh_ttl_days <= 0 {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_TTL_DAYS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.tokens.access_ttl_mins >= self.tokens.refresh_ttl_days * 24 * 60 {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_TTL_MINS".to_string(),
                reason: format!(
                    "Must be shorter than the refresh lifetime ({} days)",
                    self.tokens.refresh_ttl_days
                ),
            });
        }

        if !self.frontend_url.starts_with("http://") && !self.frontend_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "FRONTEND_URL".to_string(),
                reason: "Must be an absolute http(s) URL".to_string(),
            });
        }

        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "TOKEN_CLEANUP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:8080".parse().unwrap(),
            database: DatabaseConfig {
                database_url: "postgres://localhost/test".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_secs: 5,
                idle_timeout_secs: 300,
                max_lifetime_secs: 1800,
            },
            security: SecurityConfig {
                jwt_secret: "a".repeat(32),
                password_pepper: "a".repeat(16),
            },
            tokens: TokenConfig {
                access_ttl_mins: 15,
                refresh_ttl_days: 7,
            },
            frontend_url: "https://app.example.com".to_string(),
            cleanup_interval_secs: 3600,
            metrics_bind: None,
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn test_validation_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_access_ttl() {
        let mut config = base_config();
        config.tokens.access_ttl_mins = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validation_rejects_access_outliving_refresh() {
        let mut config = base_config();
        config.tokens.access_ttl_mins = 8 * 24 * 60;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_validation_rejects_relative_frontend_url() {
        let mut config = base_config();
        config.frontend_url = "app.example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
