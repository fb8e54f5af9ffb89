//! Counters for store calls made through the resilient client.

use crate::resilience::{CircuitBreakerMetrics, CircuitState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Read,
    Write,
    Admin,
}

impl OperationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

/// Every call the client can issue against a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOperation {
    Get,
    Set,
    SetIfExists,
    Delete,
    IncrementWindow,
    ListPush,
    ListPushFront,
    ListPop,
    ListLen,
    SetAdd,
    SetMembers,
    SetRemove,
    Ping,
    MemoryInfo,
}

impl StoreOperation {
    pub const fn category(self) -> OperationCategory {
        match self {
            Self::Get | Self::ListLen | Self::SetMembers => OperationCategory::Read,
            Self::Set
            | Self::SetIfExists
            | Self::Delete
            | Self::IncrementWindow
            | Self::ListPush
            | Self::ListPushFront
            | Self::ListPop
            | Self::SetAdd
            | Self::SetRemove => OperationCategory::Write,
            Self::Ping | Self::MemoryInfo => OperationCategory::Admin,
        }
    }

    /// List pushes and pops change the list each time they land. A call that
    /// timed out may still have landed, so repeating it could drop or
    /// duplicate an element.
    pub const fn is_idempotent(self) -> bool {
        !matches!(self, Self::ListPush | Self::ListPushFront | Self::ListPop)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::SetIfExists => "set_if_exists",
            Self::Delete => "delete",
            Self::IncrementWindow => "increment_window",
            Self::ListPush => "list_push",
            Self::ListPushFront => "list_push_front",
            Self::ListPop => "list_pop",
            Self::ListLen => "list_len",
            Self::SetAdd => "set_add",
            Self::SetMembers => "set_members",
            Self::SetRemove => "set_remove",
            Self::Ping => "ping",
            Self::MemoryInfo => "memory_info",
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientMetrics {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    rejected_by_circuit: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    admin: AtomicU64,
}

impl ClientMetrics {
    pub fn record(&self, operation: StoreOperation, success: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let counter = match operation.category() {
            OperationCategory::Read => &self.reads,
            OperationCategory::Write => &self.writes,
            OperationCategory::Admin => &self.admin,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_rejection(&self) {
        self.rejected_by_circuit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, circuit_breaker: CircuitBreakerMetrics) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            total_operations: self.total.load(Ordering::Relaxed),
            successful_operations: self.succeeded.load(Ordering::Relaxed),
            failed_operations: self.failed.load(Ordering::Relaxed),
            retried_attempts: self.retried.load(Ordering::Relaxed),
            rejected_by_circuit: self.rejected_by_circuit.load(Ordering::Relaxed),
            read_operations: self.reads.load(Ordering::Relaxed),
            write_operations: self.writes.load(Ordering::Relaxed),
            admin_operations: self.admin.load(Ordering::Relaxed),
            circuit_state: circuit_breaker.current_state,
            circuit_breaker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetricsSnapshot {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Attempts beyond the first, across all calls
    pub retried_attempts: u64,
    pub rejected_by_circuit: u64,
    pub read_operations: u64,
    pub write_operations: u64,
    pub admin_operations: u64,
    pub circuit_state: CircuitState,
    pub circuit_breaker: CircuitBreakerMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(StoreOperation::Get.category(), OperationCategory::Read);
        assert_eq!(StoreOperation::ListPop.category(), OperationCategory::Write);
        assert_eq!(StoreOperation::IncrementWindow.category(), OperationCategory::Write);
        assert_eq!(StoreOperation::SetIfExists.category(), OperationCategory::Write);
        assert_eq!(StoreOperation::Ping.category(), OperationCategory::Admin);
    }

    #[test]
    fn test_list_mutations_are_not_idempotent() {
        assert!(!StoreOperation::ListPush.is_idempotent());
        assert!(!StoreOperation::ListPushFront.is_idempotent());
        assert!(!StoreOperation::ListPop.is_idempotent());
        assert!(StoreOperation::ListLen.is_idempotent());
        assert!(StoreOperation::Set.is_idempotent());
    }

    #[test]
    fn test_counts_per_category() {
        let metrics = ClientMetrics::default();
        metrics.record(StoreOperation::Get, true);
        metrics.record(StoreOperation::Set, false);
        metrics.record(StoreOperation::Ping, true);
        metrics.record_retry();

        let breaker = crate::resilience::CircuitBreaker::new(
            "test",
            crate::resilience::CircuitBreakerConfig::default(),
        );
        let snapshot = metrics.snapshot(breaker.metrics());
        assert_eq!(snapshot.total_operations, 3);
        assert_eq!(snapshot.successful_operations, 2);
        assert_eq!(snapshot.failed_operations, 1);
        assert_eq!(snapshot.retried_attempts, 1);
        assert_eq!(snapshot.read_operations, 1);
        assert_eq!(snapshot.write_operations, 1);
        assert_eq!(snapshot.admin_operations, 1);
        assert_eq!(snapshot.circuit_state, CircuitState::Closed);
    }
}
