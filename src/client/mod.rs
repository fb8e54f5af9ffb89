//! Store client: resilience, tenant scoping, health and metrics.

pub mod health;
pub mod metrics;
pub mod resilient_store_client;

pub use health::{HealthReport, HealthStatus, MemoryReport, MemoryStatus, TestOperations};
pub use metrics::{ClientMetricsSnapshot, OperationCategory, StoreOperation};
pub use resilient_store_client::{ResilientStoreClient, TenantStore};
