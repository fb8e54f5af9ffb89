//! Fixed-window request counter per `(identifier, type, window)`.

use crate::error::{CacheError, CacheResult};
use crate::models::{CacheKey, RateLimitType, RateWindow};
use crate::validation::{validate_positive, validate_segment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Limit applied by [`crate::manager::CacheManager::check_rate_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub limit: u64,
    pub window: RateWindow,
    /// Extra requests tolerated once `limit` is spent, counted separately.
    #[serde(default)]
    pub burst: u64,
}

impl RateLimitConfig {
    pub fn new(limit: u64, window: RateWindow) -> CacheResult<Self> {
        validate_positive("rate limit", limit)?;
        Ok(Self {
            limit,
            window,
            burst: 0,
        })
    }

    #[must_use]
    pub fn with_burst(mut self, burst: u64) -> Self {
        self.burst = burst;
        self
    }

    pub fn validate(&self) -> CacheResult<()> {
        validate_positive("rate limit", self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// The request was admitted from the burst allowance.
    #[serde(default)]
    pub burst: bool,
}

impl RateLimitDecision {
    /// Decision used when the store cannot be reached.
    pub fn fail_open(config: &RateLimitConfig) -> Self {
        Self {
            allowed: true,
            remaining: config.limit,
            reset_at: Utc::now() + config.window.as_chrono(),
            burst: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub identifier: String,
    pub limit_type: RateLimitType,
    pub window: RateWindow,
    pub limit: u64,
    pub current_count: u64,
    pub reset_time: DateTime<Utc>,
}

impl RateLimit {
    pub fn create(
        identifier: &str,
        limit_type: RateLimitType,
        window: RateWindow,
        limit: u64,
    ) -> CacheResult<Self> {
        validate_segment("identifier", identifier)?;
        validate_positive("rate limit", limit)?;
        Ok(Self {
            identifier: identifier.to_string(),
            limit_type,
            window,
            limit,
            current_count: 0,
            reset_time: Utc::now() + window.as_chrono(),
        })
    }

    pub fn key(&self) -> CacheResult<CacheKey> {
        CacheKey::rate_limit(self.limit_type, &self.identifier, self.window)
    }

    pub fn check(&mut self) -> RateLimitDecision {
        self.check_at(Utc::now())
    }

    /// Rolls the window when `now >= reset_time` (a request exactly at the
    /// boundary belongs to the new window), then counts the request if it
    /// fits under the limit.
    pub fn check_at(&mut self, now: DateTime<Utc>) -> RateLimitDecision {
        if self.is_window_expired_at(now) {
            self.current_count = 0;
            self.reset_time = now + self.window.as_chrono();
        }

        let allowed = self.current_count < self.limit;
        if allowed {
            self.current_count += 1;
        }

        RateLimitDecision {
            allowed,
            remaining: self.remaining(),
            reset_at: self.reset_time,
            burst: false,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current_count)
    }

    pub fn is_window_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_time
    }

    /// Rebuilds the entity from an atomic store count.
    pub fn from_store_count(
        identifier: &str,
        limit_type: RateLimitType,
        config: &RateLimitConfig,
        count: u64,
        reset_in: std::time::Duration,
    ) -> CacheResult<Self> {
        let reset_in = chrono::Duration::from_std(reset_in)
            .map_err(|e| CacheError::InvalidState(format!("rate window out of range: {e}")))?;
        let mut limit = Self::create(identifier, limit_type, config.window, config.limit)?;
        limit.current_count = count.min(config.limit);
        limit.reset_time = Utc::now() + reset_in;
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixth_request_denied_then_window_resets() {
        let mut limit = RateLimit::create("user-1", RateLimitType::User, RateWindow::Minute, 5).unwrap();
        let start = Utc::now();
        for expected_remaining in (0..5).rev() {
            let decision = limit.check_at(start);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limit.check_at(start);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        let after_reset = limit.reset_time + chrono::Duration::seconds(1);
        let decision = limit.check_at(after_reset);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_request_at_reset_time_starts_new_window() {
        let mut limit = RateLimit::create("user-1", RateLimitType::User, RateWindow::Minute, 1).unwrap();
        let now = Utc::now();
        assert!(limit.check_at(now).allowed);
        assert!(!limit.check_at(now).allowed);

        let boundary = limit.reset_time;
        let decision = limit.check_at(boundary);
        assert!(decision.allowed);
        assert_eq!(decision.reset_at, boundary + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(RateLimit::create("", RateLimitType::User, RateWindow::Minute, 5).is_err());
        assert!(RateLimit::create("u", RateLimitType::User, RateWindow::Minute, 0).is_err());
        assert!(RateLimitConfig::new(0, RateWindow::Hour).is_err());
    }

    #[test]
    fn test_key_embeds_window() {
        let limit = RateLimit::create("proj-9", RateLimitType::Project, RateWindow::Hour, 10).unwrap();
        assert_eq!(limit.key().unwrap().as_str(), "rate_limit:project:proj-9:3600s");
    }
}
