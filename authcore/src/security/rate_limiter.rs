//! Rate limiting for security endpoints.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::errors::{RateLimitError, RateLimiterResult};

/// Rate limit configuration for an endpoint
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum attempts allowed in window
    pub max_attempts: u32,

    /// Time window in seconds
    pub window_secs: u64,
}

impl RateLimitConfig {
    /// Configuration for the login endpoint
    pub fn login() -> Self {
        Self {
            max_attempts: env_or("RATE_LIMIT_LOGIN_ATTEMPTS", 5),
            window_secs: env_or("RATE_LIMIT_LOGIN_WINDOW_SECS", 300),
        }
    }

    /// Configuration for the registration endpoint
    pub fn register() -> Self {
        Self {
            max_attempts: env_or("RATE_LIMIT_REGISTER_ATTEMPTS", 5),
            window_secs: env_or("RATE_LIMIT_REGISTER_WINDOW_SECS", 3600),
        }
    }

    /// Configuration for the password reset request endpoint
    pub fn password_reset() -> Self {
        Self {
            max_attempts: env_or("RATE_LIMIT_RESET_ATTEMPTS", 3),
            window_secs: env_or("RATE_LIMIT_RESET_WINDOW_SECS", 3600),
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.window_secs as i64)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Counter state for one (endpoint, identifier) key
#[derive(Debug, Clone)]
struct WindowState {
    attempts: u32,
    window_start: DateTime<Utc>,
}

/// Keyed sliding-window rate limiter.
///
/// Counters are in-process shared state guarded by one lock; check and
/// record happen under the same write guard, so concurrent requests on a
/// key cannot all pass the check before any of them is counted. A window
/// resets once it has fully elapsed from the first request observed in it.
pub struct RateLimiter {
    windows: RwLock<HashMap<String, WindowState>>,
    configs: HashMap<String, RateLimitConfig>,
}

impl RateLimiter {
    /// Create a rate limiter with the standard endpoint configurations.
    pub fn new() -> Self {
        let mut configs = HashMap::new();
        configs.insert("login".to_string(), RateLimitConfig::login());
        configs.insert("register".to_string(), RateLimitConfig::register());
        configs.insert(
            "password_reset".to_string(),
            RateLimitConfig::password_reset(),
        );

        Self {
            windows: RwLock::new(HashMap::new()),
            configs,
        }
    }

    /// Create a rate limiter with explicit endpoint configurations.
    pub fn with_configs(configs: HashMap<String, RateLimitConfig>) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            configs,
        }
    }

    /// Atomically check the limit and record the attempt.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::InvalidEndpoint`] when no configuration exists for
    /// `endpoint`.
    pub async fn check_and_record(
        &self,
        endpoint: &str,
        identifier: &str,
    ) -> RateLimiterResult<RateLimitResult> {
        let config = self
            .configs
            .get(endpoint)
            .ok_or_else(|| RateLimitError::InvalidEndpoint(endpoint.to_string()))?;

        let key = format!("{endpoint}:{identifier}");
        let now = Utc::now();

        // Single write guard across check and record keeps the increment
        // atomic with respect to concurrent requests on the same key.
        let mut windows = self.windows.write().await;
        let state = windows.entry(key).or_insert(WindowState {
            attempts: 0,
            window_start: now,
        });

        if now - state.window_start > config.window() {
            state.attempts = 0;
            state.window_start = now;
        }

        if state.attempts >= config.max_attempts {
            let retry_after = (state.window_start + config.window() - now)
                .num_seconds()
                .max(0) as u64;
            return Ok(RateLimitResult::Rejected { retry_after });
        }

        state.attempts += 1;
        Ok(RateLimitResult::Allowed {
            remaining: config.max_attempts - state.attempts,
        })
    }

    /// Drop counters whose window has fully elapsed, returning how many
    /// were removed. Safe to run concurrently with request handling.
    pub async fn prune(&self) -> usize {
        let mut windows = self.windows.write().await;
        let now = Utc::now();
        let before = windows.len();

        windows.retain(|key, state| {
            let window = key
                .split_once(':')
                .and_then(|(endpoint, _)| self.configs.get(endpoint))
                .map(RateLimitConfig::window)
                .unwrap_or_else(Duration::zero);
            now - state.window_start <= window
        });

        before - windows.len()
    }

    /// Number of live counters, for metrics.
    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Action is allowed
    Allowed { remaining: u32 },

    /// Action is blocked until the window turns over
    Rejected { retry_after: u64 },
}

impl RateLimitResult {
    /// Check if the action is allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    /// Get remaining attempts (if allowed)
    pub fn remaining(&self) -> Option<u32> {
        match self {
            RateLimitResult::Allowed { remaining } => Some(*remaining),
            _ => None,
        }
    }

    /// Get retry-after seconds (if rejected)
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            RateLimitResult::Rejected { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    fn limiter_with(endpoint: &str, max_attempts: u32, window_secs: u64) -> RateLimiter {
        let mut configs = HashMap::new();
        configs.insert(
            endpoint.to_string(),
            RateLimitConfig {
                max_attempts,
                window_secs,
            },
        );
        RateLimiter::with_configs(configs)
    }

    #[tokio::test]
    async fn test_allows_within_limit() {
        let limiter = limiter_with("test_endpoint", 5, 60);

        for i in 1..=5 {
            let result = limiter
                .check_and_record("test_endpoint", "test_user")
                .await
                .unwrap();

            match result {
                RateLimitResult::Allowed { remaining } => {
                    assert_eq!(remaining, 5 - i, "Attempt {}: wrong remaining count", i);
                }
                RateLimitResult::Rejected { .. } => {
                    panic!("Attempt {}: should be allowed, got rejected", i);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_rejects_over_limit() {
        let limiter = limiter_with("test_endpoint", 3, 60);

        for _ in 0..3 {
            assert!(
                limiter
                    .check_and_record("test_endpoint", "test_user")
                    .await
                    .unwrap()
                    .is_allowed()
            );
        }

        // The (limit+1)-th request within the window is rejected.
        let result = limiter
            .check_and_record("test_endpoint", "test_user")
            .await
            .unwrap();
        assert!(matches!(result, RateLimitResult::Rejected { .. }));
        assert!(result.retry_after().is_some());
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_an_error() {
        let limiter = limiter_with("known", 1, 60);
        let result = limiter.check_and_record("unknown", "user").await;
        assert!(matches!(result, Err(RateLimitError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_window_expiry_allows_again() {
        let limiter = limiter_with("test_endpoint", 2, 1);

        assert!(limiter.check_and_record("test_endpoint", "u").await.unwrap().is_allowed());
        assert!(limiter.check_and_record("test_endpoint", "u").await.unwrap().is_allowed());
        assert!(!limiter.check_and_record("test_endpoint", "u").await.unwrap().is_allowed());

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let result = limiter.check_and_record("test_endpoint", "u").await.unwrap();
        assert!(
            matches!(result, RateLimitResult::Allowed { remaining: 1 }),
            "new window starts with a fresh count"
        );
    }

    #[tokio::test]
    async fn test_different_identifiers_independent() {
        let limiter = limiter_with("test_endpoint", 2, 60);

        for _ in 0..2 {
            limiter.check_and_record("test_endpoint", "user1").await.unwrap();
        }
        assert!(!limiter.check_and_record("test_endpoint", "user1").await.unwrap().is_allowed());

        let result = limiter.check_and_record("test_endpoint", "user2").await.unwrap();
        assert!(
            matches!(result, RateLimitResult::Allowed { remaining: 1 }),
            "Different identifiers must have independent counters"
        );
    }

    #[tokio::test]
    async fn test_concurrent_requests_no_limit_bypass() {
        let limiter = Arc::new(limiter_with("test_endpoint", 5, 60));

        let mut join_set = JoinSet::new();
        for _ in 0..100 {
            let limiter = Arc::clone(&limiter);
            join_set.spawn(async move {
                limiter
                    .check_and_record("test_endpoint", "concurrent_user")
                    .await
            });
        }

        let mut allowed_count = 0;
        let mut rejected_count = 0;
        while let Some(result) = join_set.join_next().await {
            match result.unwrap().unwrap() {
                RateLimitResult::Allowed { .. } => allowed_count += 1,
                RateLimitResult::Rejected { .. } => rejected_count += 1,
            }
        }

        assert_eq!(
            allowed_count, 5,
            "Expected exactly 5 allowed requests (no race condition), got {}",
            allowed_count
        );
        assert_eq!(rejected_count, 95);
    }

    #[tokio::test]
    async fn test_prune_drops_only_elapsed_windows() {
        let limiter = limiter_with("test_endpoint", 2, 1);

        limiter.check_and_record("test_endpoint", "old").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        limiter.check_and_record("test_endpoint", "fresh").await.unwrap();

        assert_eq!(limiter.tracked_keys().await, 2);
        let removed = limiter.prune().await;
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys().await, 1);
    }
}
