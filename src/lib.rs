#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, DashMap in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker KV
//!
//! Shared key-value layer for the Tasker services: project document caching
//! with tag invalidation, fixed-window rate limiting, workflow progress
//! tracking, user sessions, and priority task queues.
//!
//! ## Architecture
//!
//! - [`models`] - key, TTL and version value objects plus the persisted entities
//! - [`store`] - the [`store::KeyValueStore`] contract with in-memory and Redis backends
//! - [`resilience`] - circuit breaker and bounded retry
//! - [`client`] - the resilient store client, tenant-scoped handles, health and metrics
//! - [`services`] - tag invalidation and session policy
//! - [`manager`] - the [`CacheManager`] façade and its per-operation failure policies
//! - [`config`] - layered configuration from defaults and `TASKER_KV_*` variables
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tasker_kv::{CacheManager, KvConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KvConfig::from_env()?;
//! let manager = CacheManager::in_memory(config)
//!     .for_tenant("3f1c1d52-8f0e-4a6b-9d41-1b7e0e4c2a10")?;
//!
//! manager
//!     .cache_project_data("3f1c1d52-8f0e-4a6b-9d41-1b7e0e4c2a10", json!({"name": "demo"}), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod manager;
pub mod models;
pub mod resilience;
pub mod services;
pub mod store;
pub mod validation;

pub use client::{HealthReport, HealthStatus, ResilientStoreClient, TenantStore};
pub use config::{Environment, KvConfig};
pub use error::{CacheError, CacheResult};
pub use manager::{CacheManager, FailurePolicy, ManagerOperation};
pub use models::{
    CacheKey, CacheTag, CacheVersion, Progress, ProjectCache, QueuePriority, QueuedTask,
    RateLimitConfig, RateLimitDecision, RateLimitType, RateWindow, TaskStatus, Ttl, UserSession,
};
pub use store::{InMemoryStore, KeyValueStore, StoreError};
