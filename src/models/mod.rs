//! # Entity and Value Models
//!
//! Value objects (`CacheKey`, `Ttl`, `CacheVersion`, `CacheTag`, priorities
//! and windows) and the entities persisted as JSON blobs in the shared
//! store. Entities validate their own input and never touch the store.

pub mod cache_key;
pub mod priority;
pub mod progress;
pub mod project_cache;
pub mod rate_limit;
pub mod task_queue;
pub mod ttl;
pub mod user_session;
pub mod version;

pub use cache_key::{CacheKey, KeyKind};
pub use priority::{QueuePriority, RateLimitType, RateWindow};
pub use progress::{Progress, ProgressState, StepMessage};
pub use project_cache::{CacheStatus, ProjectCache};
pub use rate_limit::{RateLimit, RateLimitConfig, RateLimitDecision};
pub use task_queue::{QueueName, QueuedTask, TaskQueue, TaskStatus};
pub use ttl::Ttl;
pub use user_session::UserSession;
pub use version::{CacheTag, CacheVersion};
