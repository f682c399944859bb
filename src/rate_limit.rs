//! Fixed-window rate limiting keyed by caller identity.
//!
//! The limiter is injected through [`crate::app::AppState`] as a trait object so a
//! shared (multi-instance) backend can replace the in-process one.
//!
//! Windows reset lazily: the first call after a window has elapsed starts a new
//! one with a count of 1. There is no background sweep, so keys that stop
//! sending traffic stay in memory for the life of the process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::errors::AppError;

pub const DEFAULT_MAX_REQUESTS: u32 = 30;
pub const DEFAULT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let max_requests = std::env::var("RATE_LIMIT_MAX")
            .map(|val| val.parse::<u32>())
            .unwrap_or(Ok(DEFAULT_MAX_REQUESTS))
            .map_err(|_| AppError::configuration("RATE_LIMIT_MAX must be a valid integer"))?;
        let window_secs = std::env::var("RATE_LIMIT_WINDOW_SECS")
            .map(|val| val.parse::<u64>())
            .unwrap_or(Ok(DEFAULT_WINDOW_SECS))
            .map_err(|_| AppError::configuration("RATE_LIMIT_WINDOW_SECS must be a valid integer"))?;

        if window_secs == 0 {
            return Err(AppError::configuration("RATE_LIMIT_WINDOW_SECS must be greater than zero"));
        }

        Ok(Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }
}

/// Outcome of a single rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one call for `key` and reports whether it is within the limit.
    async fn check(&self, key: &str) -> RateLimitDecision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Process-local limiter. The whole check-then-increment runs under one lock.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let window = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(window.started_at);
        if elapsed >= self.config.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.config.max_requests {
            let retry_after = self.config.window.saturating_sub(elapsed);
            return RateLimitDecision::Limited { retry_after };
        }

        window.count += 1;
        RateLimitDecision::Allowed { count: window.count }
    }

    /// Number of keys currently retained.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }
}

/// Maps a limited decision to a 429 error.
pub async fn enforce(limiter: &dyn RateLimiter, key: &str) -> Result<(), AppError> {
    match limiter.check(key).await {
        RateLimitDecision::Allowed { .. } => Ok(()),
        RateLimitDecision::Limited { retry_after } => {
            tracing::info!(key = %key, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            Err(AppError::too_many_requests(format!(
                "rate limit exceeded, retry in {}s",
                retry_after.as_secs().max(1)
            )))
        }
    }
}
