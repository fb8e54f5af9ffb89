//! # Configuration
//!
//! Compiled defaults overlaid with `TASKER_KV_*` environment variables via
//! the `config` crate. Nested sections use a double underscore, e.g.
//! `TASKER_KV_RETRY__MAX_ATTEMPTS=5`.

use crate::constants::{health, queues, retry, ttl};
use crate::error::{CacheError, CacheResult};
use crate::models::Ttl;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_PREFIX: &str = "TASKER_KV";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Reads `TASKER_ENV`, then `APP_ENV`. Unknown values fall back to
    /// development.
    pub fn detect() -> Self {
        std::env::var("TASKER_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: retry::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: retry::DEFAULT_MAX_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let store = CircuitBreakerConfig::for_store();
        Self {
            failure_threshold: store.failure_threshold,
            timeout_seconds: store.timeout.as_secs(),
            success_threshold: store.success_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvConfig {
    pub environment: Environment,
    pub progress_ttl_seconds: u64,
    pub project_ttl_seconds: u64,
    pub session_ttl_seconds: u64,
    pub queue_max_size: usize,
    /// Per-call transport timeout
    pub store_timeout_ms: u64,
    /// Denominator for memory percentages when the backend reports no cap
    pub memory_capacity_bytes: u64,
    /// Only read when the `store-redis` feature is enabled
    #[serde(default)]
    pub redis_url: Option<String>,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            environment: Environment::detect(),
            progress_ttl_seconds: ttl::PROGRESS_SECONDS,
            project_ttl_seconds: ttl::PROJECT_DATA_SECONDS,
            session_ttl_seconds: ttl::SESSION_SECONDS,
            queue_max_size: queues::DEFAULT_MAX_SIZE,
            store_timeout_ms: retry::DEFAULT_STORE_TIMEOUT_MS,
            memory_capacity_bytes: health::DEFAULT_MEMORY_CAPACITY_BYTES,
            redis_url: None,
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl KvConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> CacheResult<Self> {
        Self::load(None)
    }

    /// Defaults overlaid with `vars` in place of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::load(Some(map))
    }

    fn load(source: Option<config::Map<String, String>>) -> CacheResult<Self> {
        let defaults = config::Config::try_from(&Self::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(source),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> CacheResult<()> {
        for (field, seconds) in [
            ("progress_ttl_seconds", self.progress_ttl_seconds),
            ("project_ttl_seconds", self.project_ttl_seconds),
            ("session_ttl_seconds", self.session_ttl_seconds),
        ] {
            Ttl::from_seconds(seconds)
                .map_err(|e| CacheError::Configuration(format!("{field}: {e}")))?;
        }

        if self.queue_max_size == 0 {
            return Err(CacheError::Configuration(
                "queue_max_size must be greater than 0".to_string(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(CacheError::Configuration(
                "store_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.memory_capacity_bytes == 0 {
            return Err(CacheError::Configuration(
                "memory_capacity_bytes must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CacheError::Configuration(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(CacheError::Configuration(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        self.circuit_breaker_config()
            .validate()
            .map_err(|e| CacheError::Configuration(format!("circuit_breaker: {e}")))?;

        Ok(())
    }

    /// Production deployments reject store calls without a tenant id.
    pub fn requires_tenant(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn progress_ttl(&self) -> Ttl {
        Ttl::from_seconds(self.progress_ttl_seconds).unwrap_or_else(|_| Ttl::progress())
    }

    pub fn project_ttl(&self) -> Ttl {
        Ttl::from_seconds(self.project_ttl_seconds).unwrap_or_else(|_| Ttl::project_data())
    }

    pub fn session_ttl(&self) -> Ttl {
        Ttl::from_seconds(self.session_ttl_seconds).unwrap_or_else(|_| Ttl::session())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            timeout: Duration::from_secs(self.circuit_breaker.timeout_seconds),
            success_threshold: self.circuit_breaker.success_threshold,
        }
    }

    /// Defaults for tests: no backoff, short timeouts, no tenant requirement.
    pub fn for_testing() -> Self {
        Self {
            environment: Environment::Test,
            store_timeout_ms: 500,
            retry: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 10,
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = KvConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.progress_ttl().seconds(), 86_400);
        assert_eq!(config.queue_max_size, 1_000);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_progress_ttl_override() {
        let config = KvConfig::from_vars([("TASKER_KV_PROGRESS_TTL_SECONDS", "600")]).unwrap();
        assert_eq!(config.progress_ttl_seconds, 600);
        assert_eq!(config.project_ttl_seconds, 3_600);
    }

    #[test]
    fn test_nested_and_environment_overrides() {
        let config = KvConfig::from_vars([
            ("TASKER_KV_ENVIRONMENT", "production"),
            ("TASKER_KV_RETRY__MAX_ATTEMPTS", "5"),
            ("TASKER_KV_CIRCUIT_BREAKER__TIMEOUT_SECONDS", "10"),
        ])
        .unwrap();
        assert!(config.requires_tenant());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.circuit_breaker_config().timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let zero_ttl = KvConfig::from_vars([("TASKER_KV_SESSION_TTL_SECONDS", "0")]);
        assert!(matches!(zero_ttl, Err(CacheError::Configuration(_))));

        let too_long = KvConfig::from_vars([("TASKER_KV_PROGRESS_TTL_SECONDS", "31536001")]);
        assert!(matches!(too_long, Err(CacheError::Configuration(_))));

        let no_queue = KvConfig::from_vars([("TASKER_KV_QUEUE_MAX_SIZE", "0")]);
        assert!(matches!(no_queue, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("Production"), Environment::Production);
        assert_eq!(Environment::parse("test"), Environment::Test);
        assert_eq!(Environment::parse("staging"), Environment::Development);
    }
}
