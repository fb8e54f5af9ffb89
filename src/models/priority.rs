use crate::constants::ttl as presets;
use crate::models::Ttl;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal queue priority. `High` sorts first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueuePriority {
    High,
    #[default]
    Normal,
    Low,
}

impl QueuePriority {
    /// Dequeue order.
    pub const ALL: [QueuePriority; 3] = [Self::High, Self::Normal, Self::Low];

    /// Lane index, 0 being served first.
    pub const fn lane(&self) -> usize {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed rate-limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    pub const fn seconds(&self) -> u64 {
        match self {
            Self::Minute => presets::RATE_MINUTE_SECONDS,
            Self::Hour => presets::RATE_HOUR_SECONDS,
            Self::Day => presets::RATE_DAY_SECONDS,
        }
    }

    pub const fn ttl(&self) -> Ttl {
        match self {
            Self::Minute => Ttl::rate_minute(),
            Self::Hour => Ttl::rate_hour(),
            Self::Day => Ttl::rate_day(),
        }
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        self.ttl().as_chrono()
    }
}

/// What a rate limit counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitType {
    User,
    Project,
}

impl RateLimitType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
