//! # Resilience Module
//!
//! Fault tolerance for store access: bounded retry with exponential backoff
//! and a lock-free circuit breaker that fails fast while the backend is down.
//!
//! ```rust
//! use tasker_kv::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new("kv_store", CircuitBreakerConfig::for_store());
//! assert!(breaker.should_allow());
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use config::CircuitBreakerConfig;
pub use retry::{execute_with_retry, RetryPolicy};
