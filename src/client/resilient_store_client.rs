//! # Resilient Store Client
//!
//! Single entry point for every backend call. Each call runs inside a
//! `store_operation` span with a per-attempt timeout, the shared circuit
//! breaker, and bounded retry. Callers obtain a [`TenantStore`] handle first;
//! in production mode a handle without a tenant id is refused.

use super::health::{self, HealthReport, MemoryReport, TestOperations};
use super::metrics::{ClientMetrics, ClientMetricsSnapshot, StoreOperation};
use crate::config::KvConfig;
use crate::constants::health as health_defaults;
use crate::error::{CacheError, CacheResult};
use crate::logging::log_store_operation;
use crate::models::{CacheKey, Ttl};
use crate::resilience::{execute_with_retry, CircuitBreaker, CircuitState, RetryPolicy};
use crate::store::{InMemoryStore, KeyValueStore, StoreError, StoreResult, WindowCount};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

const CIRCUIT_NAME: &str = "kv_store";

#[derive(Debug)]
pub struct ResilientStoreClient {
    store: Arc<dyn KeyValueStore>,
    breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    call_timeout: Duration,
    require_tenant: bool,
    memory_capacity_bytes: u64,
    metrics: ClientMetrics,
}

impl ResilientStoreClient {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &KvConfig) -> Self {
        Self {
            store,
            breaker: CircuitBreaker::new(CIRCUIT_NAME, config.circuit_breaker_config()),
            retry_policy: config.retry_policy(),
            call_timeout: config.store_timeout(),
            require_tenant: config.requires_tenant(),
            memory_capacity_bytes: config.memory_capacity_bytes,
            metrics: ClientMetrics::default(),
        }
    }

    /// Client over a fresh process-local store.
    pub fn in_memory(config: &KvConfig) -> Self {
        let store = InMemoryStore::with_capacity_bytes(config.memory_capacity_bytes);
        Self::new(Arc::new(store), config)
    }

    /// Client over Redis at `config.redis_url`.
    #[cfg(feature = "store-redis")]
    pub async fn connect_redis(config: &KvConfig) -> CacheResult<Self> {
        let url = config.redis_url.as_deref().ok_or_else(|| {
            CacheError::Configuration("redis_url is required for the redis store".to_string())
        })?;
        let store = crate::store::RedisStore::connect(url).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    /// Retry policy applied to every call unless overridden on the handle.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Store handle for `tenant_id`. Production mode requires a non-empty
    /// tenant id; this check is never retried.
    pub fn scoped(&self, tenant_id: Option<&str>) -> CacheResult<TenantStore<'_>> {
        let tenant = tenant_id.map(str::trim).filter(|tenant| !tenant.is_empty());
        if self.require_tenant && tenant.is_none() {
            return Err(CacheError::ProjectIsolation(
                "store access without a tenant id is rejected in production".to_string(),
            ));
        }
        Ok(TenantStore {
            client: self,
            tenant: tenant.map(str::to_string),
            retry_policy: None,
        })
    }

    pub fn requires_tenant(&self) -> bool {
        self.require_tenant
    }

    pub fn provider_name(&self) -> &'static str {
        self.store.provider_name()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn metrics(&self) -> ClientMetricsSnapshot {
        self.metrics.snapshot(self.breaker.metrics())
    }

    /// One store call: breaker gate, timeout, retry, metrics and telemetry.
    async fn execute<T, F, Fut>(
        &self,
        operation: StoreOperation,
        target: &str,
        tenant: Option<&str>,
        policy: &RetryPolicy,
        call: F,
    ) -> StoreResult<T>
    where
        F: Fn(Arc<dyn KeyValueStore>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let category = operation.category();
        let span = info_span!(
            "store_operation",
            operation = operation.as_str(),
            category = category.as_str(),
            key = target,
            tenant_id = tenant.unwrap_or("-"),
            provider = self.store.provider_name(),
        );

        let at_most_once;
        let policy = if operation.is_idempotent() {
            policy
        } else {
            at_most_once = policy.without_timeout_retry();
            &at_most_once
        };

        async {
            let started = Instant::now();
            let result = execute_with_retry(policy, operation.as_str(), |attempt| {
                if attempt > 0 {
                    self.metrics.record_retry();
                }
                self.guarded(target, call(Arc::clone(&self.store)))
            })
            .await;

            let duration_ms = started.elapsed().as_millis() as u64;
            let status = match &result {
                Ok(_) => "success",
                Err(StoreError::CircuitOpen(_)) => "circuit_open",
                Err(StoreError::Timeout(_)) => "timeout",
                Err(_) => "error",
            };
            self.metrics.record(operation, result.is_ok());
            log_store_operation(operation.as_str(), category.as_str(), status, duration_ms);
            result
        }
        .instrument(span)
        .await
    }

    /// A single attempt behind the breaker and the transport timeout.
    async fn guarded<T>(
        &self,
        target: &str,
        attempt: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        if !self.breaker.should_allow() {
            self.metrics.record_circuit_rejection();
            return Err(StoreError::CircuitOpen(format!(
                "{} rejecting calls ({})",
                self.breaker.name(),
                target
            )));
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.call_timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => Err(StoreError::Timeout(format!(
                "{} exceeded {}ms",
                target,
                self.call_timeout.as_millis()
            ))),
        };

        let elapsed = started.elapsed();
        match &outcome {
            Err(error) if error.is_transient() => self.breaker.record_failure(elapsed),
            // The backend answered, even if it rejected the command
            _ => self.breaker.record_success(elapsed),
        }
        outcome
    }

    /// Liveness and capacity report. Runs a ping, a memory query and a
    /// set/get/delete probe on a throwaway key, without retries, so a
    /// degraded backend shows up immediately.
    pub async fn health_check(&self) -> HealthReport {
        let policy = RetryPolicy::no_retry();
        let started = Instant::now();
        let ping = self
            .execute(StoreOperation::Ping, "ping", None, &policy, |store| async move {
                store.ping().await
            })
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let memory = match self
            .execute(StoreOperation::MemoryInfo, "memory", None, &policy, |store| async move {
                store.memory_info().await
            })
            .await
        {
            Ok(info) => MemoryReport::new(
                info.used_bytes,
                info.max_bytes.unwrap_or(self.memory_capacity_bytes),
            ),
            Err(_) => MemoryReport::unknown(),
        };

        let test_operations = self.probe(&policy).await;
        let circuit_state = self.breaker.state();
        let status = health::classify(
            ping.is_ok(),
            latency_ms,
            &memory,
            &test_operations,
            circuit_state,
        );

        debug!(status = ?status, latency_ms = latency_ms, "Store health checked");

        HealthReport {
            status,
            timestamp: Utc::now(),
            service: health_defaults::SERVICE_NAME.to_string(),
            provider: self.store.provider_name().to_string(),
            memory,
            latency_ms,
            test_operations,
            circuit_state,
            error: ping.err().map(|e| e.to_string()),
        }
    }

    async fn probe(&self, policy: &RetryPolicy) -> TestOperations {
        let mut outcome = TestOperations::default();
        let Ok(key) = CacheKey::health_probe(&Uuid::new_v4().to_string()) else {
            return outcome;
        };
        let key = key.as_str();
        let ttl = Duration::from_secs(crate::constants::ttl::HEALTH_PROBE_SECONDS);
        let marker = b"ok".to_vec();

        outcome.set = self
            .execute(StoreOperation::Set, key, None, policy, |store| {
                let marker = marker.clone();
                async move { store.set(key, &marker, ttl).await }
            })
            .await
            .is_ok();

        outcome.get = self
            .execute(StoreOperation::Get, key, None, policy, |store| async move {
                store.get(key).await
            })
            .await
            .is_ok_and(|value| value.as_deref() == Some(b"ok".as_slice()));

        outcome.delete = self
            .execute(StoreOperation::Delete, key, None, policy, |store| async move {
                store.delete(key).await
            })
            .await
            .is_ok();

        outcome
    }
}

/// Store access bound to one tenant.
///
/// Keys are typed [`CacheKey`]s, so every physical key already carries its
/// owner's namespace. Store failures arrive as [`CacheError::TransientStore`]
/// after retries are exhausted.
#[derive(Debug, Clone)]
pub struct TenantStore<'a> {
    client: &'a ResilientStoreClient,
    tenant: Option<String>,
    retry_policy: Option<RetryPolicy>,
}

impl<'a> TenantStore<'a> {
    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// Overrides the client's retry policy for calls made through this handle.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    async fn call<T, F, Fut>(&self, operation: StoreOperation, target: &str, call: F) -> CacheResult<T>
    where
        F: Fn(Arc<dyn KeyValueStore>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let policy = self
            .retry_policy
            .as_ref()
            .unwrap_or(&self.client.retry_policy);
        Ok(self
            .client
            .execute(operation, target, self.tenant.as_deref(), policy, call)
            .await?)
    }

    pub async fn get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let raw = key.as_str();
        self.call(StoreOperation::Get, raw, |store| async move { store.get(raw).await })
            .await
    }

    pub async fn set(&self, key: &CacheKey, value: &[u8], ttl: Ttl) -> CacheResult<()> {
        let raw = key.as_str();
        self.call(StoreOperation::Set, raw, |store| async move {
            store.set(raw, value, ttl.as_duration()).await
        })
        .await
    }

    /// Overwrites a live key without touching its TTL. Returns `false`, and
    /// writes nothing, if the key is gone.
    pub async fn set_if_exists(&self, key: &CacheKey, value: &[u8]) -> CacheResult<bool> {
        let raw = key.as_str();
        self.call(StoreOperation::SetIfExists, raw, |store| async move {
            store.set_if_exists(raw, value).await
        })
        .await
    }

    pub async fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        let raw = key.as_str();
        self.call(StoreOperation::Delete, raw, |store| async move {
            store.delete(raw).await
        })
        .await
    }

    pub async fn increment_window(
        &self,
        key: &CacheKey,
        limit: u64,
        window: Duration,
    ) -> CacheResult<WindowCount> {
        let raw = key.as_str();
        self.call(StoreOperation::IncrementWindow, raw, |store| async move {
            store.increment_window(raw, limit, window).await
        })
        .await
    }

    pub async fn list_push(&self, key: &CacheKey, value: &[u8]) -> CacheResult<u64> {
        let raw = key.as_str();
        self.call(StoreOperation::ListPush, raw, |store| async move {
            store.list_push(raw, value).await
        })
        .await
    }

    pub async fn list_push_front(&self, key: &CacheKey, value: &[u8]) -> CacheResult<u64> {
        let raw = key.as_str();
        self.call(StoreOperation::ListPushFront, raw, |store| async move {
            store.list_push_front(raw, value).await
        })
        .await
    }

    pub async fn list_pop(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        let raw = key.as_str();
        self.call(StoreOperation::ListPop, raw, |store| async move {
            store.list_pop(raw).await
        })
        .await
    }

    pub async fn list_len(&self, key: &CacheKey) -> CacheResult<u64> {
        let raw = key.as_str();
        self.call(StoreOperation::ListLen, raw, |store| async move {
            store.list_len(raw).await
        })
        .await
    }

    pub async fn set_add(&self, key: &CacheKey, member: &str, ttl: Ttl) -> CacheResult<bool> {
        let raw = key.as_str();
        self.call(StoreOperation::SetAdd, raw, |store| async move {
            store.set_add(raw, member, ttl.as_duration()).await
        })
        .await
    }

    pub async fn set_members(&self, key: &CacheKey) -> CacheResult<Vec<String>> {
        let raw = key.as_str();
        self.call(StoreOperation::SetMembers, raw, |store| async move {
            store.set_members(raw).await
        })
        .await
    }

    pub async fn set_remove(&self, key: &CacheKey, member: &str) -> CacheResult<bool> {
        let raw = key.as_str();
        self.call(StoreOperation::SetRemove, raw, |store| async move {
            store.set_remove(raw, member).await
        })
        .await
    }

    /// `Ok(None)` on miss. A payload that no longer deserializes is reported
    /// as [`CacheError::Serialization`].
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Ttl) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes, ttl).await
    }

    pub async fn set_json_if_exists<T: Serialize>(&self, key: &CacheKey, value: &T) -> CacheResult<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.set_if_exists(key, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn client_with(store: Arc<InMemoryStore>, config: &KvConfig) -> ResilientStoreClient {
        ResilientStoreClient::new(store, config)
    }

    #[tokio::test]
    async fn test_production_rejects_missing_tenant() {
        let config = KvConfig {
            environment: Environment::Production,
            ..KvConfig::for_testing()
        };
        let client = ResilientStoreClient::in_memory(&config);
        assert!(matches!(
            client.scoped(None),
            Err(CacheError::ProjectIsolation(_))
        ));
        assert!(matches!(
            client.scoped(Some("  ")),
            Err(CacheError::ProjectIsolation(_))
        ));
        assert!(client.scoped(Some("tenant-a")).is_ok());
    }

    #[tokio::test]
    async fn test_development_allows_unscoped_access() {
        let client = ResilientStoreClient::in_memory(&KvConfig::for_testing());
        let store = client.scoped(None).unwrap();
        let key = CacheKey::agent_config("planner").unwrap();
        store.set(&key, b"{}", Ttl::max()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(InMemoryStore::new());
        let client = client_with(Arc::clone(&backend), &KvConfig::for_testing());
        let store = client.scoped(None).unwrap();
        let key = CacheKey::progress("wf-1").unwrap();

        backend.fail_next(2);
        store.set(&key, b"1", Ttl::progress()).await.unwrap();

        let metrics = client.metrics();
        assert_eq!(metrics.retried_attempts, 2);
        assert_eq!(metrics.successful_operations, 1);
        assert_eq!(metrics.write_operations, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_transient_error() {
        let backend = Arc::new(InMemoryStore::new());
        let client = client_with(Arc::clone(&backend), &KvConfig::for_testing());
        let store = client.scoped(None).unwrap();
        backend.set_available(false);

        let err = store
            .get(&CacheKey::progress("wf-1").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_store_failure());
        assert_eq!(backend.operation_count(), 3);
    }

    #[tokio::test]
    async fn test_circuit_opens_and_fails_fast() {
        let backend = Arc::new(InMemoryStore::new());
        let mut config = KvConfig::for_testing();
        config.circuit_breaker.failure_threshold = 3;
        let client = client_with(Arc::clone(&backend), &config);
        let store = client.scoped(None).unwrap();
        let key = CacheKey::progress("wf-1").unwrap();

        backend.set_available(false);
        assert!(store.get(&key).await.is_err());
        assert_eq!(client.circuit_state(), CircuitState::Open);

        let calls_before = backend.operation_count();
        assert!(store.get(&key).await.is_err());
        assert_eq!(backend.operation_count(), calls_before);
        assert_eq!(client.metrics().rejected_by_circuit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_calls_time_out() {
        let backend = Arc::new(InMemoryStore::new());
        let client = client_with(Arc::clone(&backend), &KvConfig::for_testing())
            .with_retry_policy(RetryPolicy::no_retry());
        backend.set_latency(Duration::from_secs(5));

        let err = client
            .scoped(None)
            .unwrap()
            .get(&CacheKey::progress("wf-1").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_store_failure());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_health_check_reports_healthy_store() {
        let client = ResilientStoreClient::in_memory(&KvConfig::for_testing());
        let report = client.health_check().await;
        assert_eq!(report.status, health::HealthStatus::Healthy);
        assert!(report.test_operations.all_passed());
        assert_eq!(report.service, "tasker-kv");
        assert_eq!(report.provider, "memory");
    }

    #[tokio::test]
    async fn test_health_check_reports_unreachable_store() {
        let backend = Arc::new(InMemoryStore::new());
        let client = client_with(Arc::clone(&backend), &KvConfig::for_testing());
        backend.set_available(false);

        let report = client.health_check().await;
        assert_eq!(report.status, health::HealthStatus::Unhealthy);
        assert!(!report.test_operations.set);
        assert!(report.error.is_some());
    }
}
