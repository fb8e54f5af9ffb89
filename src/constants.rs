//! # Key Namespace and Operational Limits
//!
//! Key templates, TTL presets and thresholds shared by the entity models,
//! the store client and the manager façade.

/// Key templates per entity kind. `{}` segments are filled by
/// [`crate::models::CacheKey`].
pub mod keys {
    pub const PROJECT_PREFIX: &str = "project";
    pub const SESSION_PREFIX: &str = "session";
    pub const RATE_LIMIT_PREFIX: &str = "rate_limit";
    pub const AGENT_PREFIX: &str = "agent";
    pub const PROGRESS_PREFIX: &str = "progress";
    pub const TASK_PREFIX: &str = "task";
    pub const QUEUE_PREFIX: &str = "queue";
    pub const TAG_PREFIX: &str = "cache_tag";
    pub const HEALTH_PROBE_PREFIX: &str = "health:probe";

    pub const MAX_KEY_LENGTH: usize = 250;
    pub const MAX_TAG_LENGTH: usize = 50;
}

/// TTL presets in seconds.
pub mod ttl {
    pub const MAX_TTL_SECONDS: u64 = 31_536_000;
    pub const PROJECT_DATA_SECONDS: u64 = 3_600;
    pub const SESSION_SECONDS: u64 = 7_200;
    pub const PROGRESS_SECONDS: u64 = 86_400;
    pub const TASK_STATUS_SECONDS: u64 = 86_400;
    pub const RATE_MINUTE_SECONDS: u64 = 60;
    pub const RATE_HOUR_SECONDS: u64 = 3_600;
    pub const RATE_DAY_SECONDS: u64 = 86_400;
    pub const HEALTH_PROBE_SECONDS: u64 = 10;
}

/// Queues that may be addressed by name.
pub mod queues {
    pub const EMBEDDINGS: &str = "embeddings";
    pub const AGENT_TASKS: &str = "agent_tasks";
    pub const EXPORTS: &str = "exports";

    pub const ALLOWED: &[&str] = &[EMBEDDINGS, AGENT_TASKS, EXPORTS];

    pub const DEFAULT_MAX_SIZE: usize = 1_000;
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
}

/// Health classification thresholds.
pub mod health {
    pub const SERVICE_NAME: &str = "tasker-kv";
    pub const HEALTHY_LATENCY_MS: u64 = 100;
    pub const MEMORY_WARNING_PERCENT: f64 = 80.0;
    pub const MEMORY_CRITICAL_PERCENT: f64 = 95.0;
    pub const DEFAULT_MEMORY_CAPACITY_BYTES: u64 = 256 * 1024 * 1024;
}

/// Retry defaults, overridable per call through [`crate::resilience::RetryPolicy`].
pub mod retry {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 100;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 2_000;
    pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
}

/// Session policy defaults.
pub mod sessions {
    /// Sessions with less than this much time left are extended on activity.
    pub const EXTEND_THRESHOLD_SECONDS: i64 = 900;
    /// Upper bound on total session lifetime, measured from creation.
    pub const MAX_LIFETIME_SECONDS: i64 = 86_400;
    pub const MAX_PROJECT_GRANTS: usize = 500;
}
