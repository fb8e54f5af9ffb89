//! Health report produced by [`super::ResilientStoreClient::health_check`].

use crate::constants::health;
use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl MemoryStatus {
    pub fn from_percentage(usage_percentage: f64) -> Self {
        if usage_percentage >= health::MEMORY_CRITICAL_PERCENT {
            Self::Critical
        } else if usage_percentage >= health::MEMORY_WARNING_PERCENT {
            Self::Warning
        } else {
            Self::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReport {
    pub usage_bytes: u64,
    pub usage_percentage: f64,
    pub status: MemoryStatus,
}

impl MemoryReport {
    pub fn new(usage_bytes: u64, capacity_bytes: u64) -> Self {
        let usage_percentage = if capacity_bytes == 0 {
            0.0
        } else {
            usage_bytes as f64 / capacity_bytes as f64 * 100.0
        };
        Self {
            usage_bytes,
            usage_percentage,
            status: MemoryStatus::from_percentage(usage_percentage),
        }
    }

    pub fn unknown() -> Self {
        Self {
            usage_bytes: 0,
            usage_percentage: 0.0,
            status: MemoryStatus::Unknown,
        }
    }
}

/// Outcome of each step of the set/get/delete probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOperations {
    pub set: bool,
    pub get: bool,
    pub delete: bool,
}

impl TestOperations {
    pub fn all_passed(&self) -> bool {
        self.set && self.get && self.delete
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub provider: String,
    pub memory: MemoryReport,
    pub latency_ms: u64,
    pub test_operations: TestOperations,
    pub circuit_state: CircuitState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Unhealthy on probe failure, open circuit or critical memory. Warning on
/// slow pings or memory past the warning mark.
pub fn classify(
    ping_ok: bool,
    latency_ms: u64,
    memory: &MemoryReport,
    test_operations: &TestOperations,
    circuit_state: CircuitState,
) -> HealthStatus {
    if !ping_ok
        || !test_operations.all_passed()
        || circuit_state == CircuitState::Open
        || memory.status == MemoryStatus::Critical
    {
        HealthStatus::Unhealthy
    } else if latency_ms >= health::HEALTHY_LATENCY_MS
        || matches!(memory.status, MemoryStatus::Warning | MemoryStatus::Unknown)
    {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}
