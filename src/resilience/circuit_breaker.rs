//! # Circuit Breaker Implementation
//!
//! Fault isolation for calls into the shared store. Classic three-state
//! breaker: Closed (normal operation), Open (failing fast), and Half-Open
//! (testing recovery). State and counters are atomics so the hot path never
//! takes a lock.
//!
//! Elapsed time is measured against a `tokio::time::Instant` origin, which
//! makes the open timeout follow the runtime clock (and paused test time).

use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of breaker counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub half_open_calls: u64,
    pub current_state: CircuitState,
    /// 0.0 to 1.0
    pub failure_rate: f64,
}

#[derive(Debug, Default)]
struct AtomicCounters {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU64,
    /// Trial calls admitted since the circuit went half-open
    half_open_calls: AtomicU64,
    half_open_successes: AtomicU64,
}

impl AtomicCounters {
    fn snapshot(&self, state: CircuitState) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let failure_rate = if total_calls > 0 {
            failure_count as f64 / total_calls as f64
        } else {
            0.0
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            half_open_calls: self.half_open_calls.load(Ordering::Relaxed),
            current_state: state,
            failure_rate,
        }
    }
}

/// Lock-free circuit breaker.
///
/// Used with manual recording: callers check [`CircuitBreaker::should_allow`]
/// before a call and report the outcome with `record_success` or
/// `record_failure`.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging
    name: String,

    state: AtomicU8,

    config: CircuitBreakerConfig,

    counters: AtomicCounters,

    origin: Instant,

    /// Nanos since `origin` at which the circuit opened, plus one (0 = not open).
    opened_at_nanos: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_seconds = config.timeout.as_secs(),
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            counters: AtomicCounters::default(),
            origin: Instant::now(),
            opened_at_nanos: AtomicU64::new(0),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn nanos_since_origin(&self) -> u64 {
        Instant::now()
            .saturating_duration_since(self.origin)
            .as_nanos() as u64
    }

    /// Whether a call may proceed. Moves an open circuit to half-open once
    /// the timeout has elapsed.
    pub fn should_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened = self.opened_at_nanos.load(Ordering::Acquire);
                if opened == 0 {
                    warn!(component = %self.name, "Circuit open but no timestamp recorded");
                    return true;
                }

                let elapsed = self.nanos_since_origin().saturating_sub(opened - 1);
                if elapsed < self.config.timeout.as_nanos() as u64 {
                    return false;
                }
                if self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.enter_half_open();
                }
                self.admit_trial_call()
            }
            CircuitState::HalfOpen => self.admit_trial_call(),
        }
    }

    /// Claims one of the `success_threshold` trial slots.
    fn admit_trial_call(&self) -> bool {
        let limit = u64::from(self.config.success_threshold);
        self.counters
            .half_open_calls
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |calls| {
                (calls < limit).then_some(calls + 1)
            })
            .is_ok()
    }

    pub fn record_success(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.success_count.fetch_add(1, Ordering::Relaxed);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self
                    .counters
                    .half_open_successes
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                if successes >= u64::from(self.config.success_threshold) {
                    self.transition_to_closed();
                }
            }
            CircuitState::Closed => {
                self.counters.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {
                warn!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    pub fn record_failure(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.failure_count.fetch_add(1, Ordering::Relaxed);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                let failures = self
                    .counters
                    .consecutive_failures
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                if failures >= u64::from(self.config.failure_threshold) {
                    self.transition_to_open();
                }
            }
            // Any failure while probing reopens the circuit
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Open => {}
        }
    }

    fn transition_to_closed(&self) {
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
        self.reset_trial_counters();
        self.opened_at_nanos.store(0, Ordering::Release);

        // Store state last (after counters reset)
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        info!(
            component = %self.name,
            total_calls = self.counters.total_calls.load(Ordering::Relaxed),
            "Circuit breaker closed (recovered)"
        );
    }

    fn transition_to_open(&self) {
        self.opened_at_nanos
            .store(self.nanos_since_origin() + 1, Ordering::Release);
        self.reset_trial_counters();

        self.state.store(CircuitState::Open as u8, Ordering::Release);

        warn!(
            component = %self.name,
            consecutive_failures = self.counters.consecutive_failures.load(Ordering::Relaxed),
            failure_threshold = self.config.failure_threshold,
            timeout_seconds = self.config.timeout.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    /// Runs once, for the caller that moved the state from open to
    /// half-open. Trial counters were already zeroed when the circuit opened.
    fn enter_half_open(&self) {
        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "Circuit breaker half-open (testing recovery)"
        );
    }

    fn reset_trial_counters(&self) {
        self.counters.half_open_calls.store(0, Ordering::Relaxed);
        self.counters.half_open_successes.store(0, Ordering::Relaxed);
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        self.transition_to_open();
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        self.transition_to_closed();
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.counters.snapshot(self.state())
    }
}
