use crate::constants::ttl as presets;
use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Validated time-to-live, `0 < seconds <= one year`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Ttl(u64);

impl Ttl {
    pub fn from_seconds(seconds: u64) -> CacheResult<Self> {
        if seconds == 0 {
            return Err(CacheError::validation("TTL must be greater than 0 seconds"));
        }
        if seconds > presets::MAX_TTL_SECONDS {
            return Err(CacheError::validation(format!(
                "TTL of {seconds}s exceeds the maximum of {}s",
                presets::MAX_TTL_SECONDS
            )));
        }
        Ok(Self(seconds))
    }

    /// Sub-second durations round up to one second.
    pub fn from_duration(duration: Duration) -> CacheResult<Self> {
        let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
        Self::from_seconds(seconds)
    }

    pub const fn project_data() -> Self {
        Self(presets::PROJECT_DATA_SECONDS)
    }

    pub const fn session() -> Self {
        Self(presets::SESSION_SECONDS)
    }

    pub const fn progress() -> Self {
        Self(presets::PROGRESS_SECONDS)
    }

    pub const fn task_status() -> Self {
        Self(presets::TASK_STATUS_SECONDS)
    }

    pub const fn rate_minute() -> Self {
        Self(presets::RATE_MINUTE_SECONDS)
    }

    pub const fn rate_hour() -> Self {
        Self(presets::RATE_HOUR_SECONDS)
    }

    pub const fn rate_day() -> Self {
        Self(presets::RATE_DAY_SECONDS)
    }

    pub const fn max() -> Self {
        Self(presets::MAX_TTL_SECONDS)
    }

    pub const fn seconds(&self) -> u64 {
        self.0
    }

    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        // Bounded by MAX_TTL_SECONDS, so the cast cannot truncate.
        chrono::Duration::seconds(self.0 as i64)
    }
}

impl TryFrom<u64> for Ttl {
    type Error = CacheError;

    fn try_from(seconds: u64) -> Result<Self, Self::Error> {
        Self::from_seconds(seconds)
    }
}

impl From<Ttl> for u64 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert!(Ttl::from_seconds(0).is_err());
        assert!(Ttl::from_seconds(1).is_ok());
        assert!(Ttl::from_seconds(31_536_000).is_ok());
        assert!(Ttl::from_seconds(31_536_001).is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(Ttl::project_data().seconds(), 3_600);
        assert_eq!(Ttl::session().seconds(), 7_200);
        assert_eq!(Ttl::rate_minute().seconds(), 60);
        assert_eq!(Ttl::rate_hour().seconds(), 3_600);
        assert_eq!(Ttl::rate_day().seconds(), 86_400);
    }

    #[test]
    fn test_from_duration_rounds_up() {
        let ttl = Ttl::from_duration(Duration::from_millis(1_500)).unwrap();
        assert_eq!(ttl.seconds(), 2);
        assert!(Ttl::from_duration(Duration::ZERO).is_err());
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Ttl>("0").is_err());
        assert_eq!(serde_json::from_str::<Ttl>("60").unwrap(), Ttl::rate_minute());
    }
}
