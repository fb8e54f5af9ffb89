//! # Cache Manager
//!
//! Façade over the entities and the resilient store client. Each operation
//! builds its entity, derives the key, and goes through a
//! [`TenantStore`] handle. What happens when the store stays unreachable
//! after retries is decided by the static [`FailurePolicy`] table:
//!
//! | Operation group | Policy |
//! |---|---|
//! | project cache, progress, agent config | fail soft (`false` / `None` / `0`) |
//! | rate limit check | fail open (`allowed = true`) |
//! | sessions, queues | fail hard (error propagates) |
//!
//! Validation and tenant-isolation errors always propagate.

use crate::client::{ClientMetricsSnapshot, HealthReport, ResilientStoreClient, TenantStore};
use crate::config::KvConfig;
use crate::error::{CacheError, CacheResult};
use crate::logging::log_degraded_operation;
use crate::models::{
    CacheKey, CacheTag, Progress, ProjectCache, QueueName, QueuePriority, QueuedTask, RateLimit,
    RateLimitConfig, RateLimitDecision, RateLimitType, TaskStatus, Ttl, UserSession,
};
use crate::services::{CacheInvalidationService, SessionManagementService};
use crate::validation::validate_uuid_segment;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Availability policy for one manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Allow the request as if the store had said yes.
    FailOpen,
    /// Report a neutral result (`false`, `None`, `0`).
    FailSoft,
    /// Propagate the store error.
    FailHard,
}

impl FailurePolicy {
    pub const fn for_operation(operation: ManagerOperation) -> Self {
        use ManagerOperation::*;
        match operation {
            CheckRateLimit => Self::FailOpen,
            CacheProjectData | GetProjectData | InvalidateProjectCache | InvalidateByTag
            | StartProgress | UpdateProgress | CompleteProgress | FailProgress | GetProgress
            | CacheAgentConfig | GetAgentConfig => Self::FailSoft,
            CreateSession | ValidateSession | RevokeSession | GrantProjectAccess
            | RevokeProjectAccess | ExtendSession | EnqueueTask | DequeueTask | CompleteTask
            | FailTask | GetTaskStatus | QueueLength => Self::FailHard,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailOpen => "fail_open",
            Self::FailSoft => "fail_soft",
            Self::FailHard => "fail_hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerOperation {
    CacheProjectData,
    GetProjectData,
    InvalidateProjectCache,
    InvalidateByTag,
    CheckRateLimit,
    StartProgress,
    UpdateProgress,
    CompleteProgress,
    FailProgress,
    GetProgress,
    CreateSession,
    ValidateSession,
    RevokeSession,
    GrantProjectAccess,
    RevokeProjectAccess,
    ExtendSession,
    EnqueueTask,
    DequeueTask,
    CompleteTask,
    FailTask,
    GetTaskStatus,
    QueueLength,
    CacheAgentConfig,
    GetAgentConfig,
}

impl ManagerOperation {
    pub const fn as_str(self) -> &'static str {
        use ManagerOperation::*;
        match self {
            CacheProjectData => "cache_project_data",
            GetProjectData => "get_project_data",
            InvalidateProjectCache => "invalidate_project_cache",
            InvalidateByTag => "invalidate_by_tag",
            CheckRateLimit => "check_rate_limit",
            StartProgress => "start_progress_tracking",
            UpdateProgress => "update_progress",
            CompleteProgress => "complete_progress",
            FailProgress => "fail_progress",
            GetProgress => "get_progress",
            CreateSession => "create_user_session",
            ValidateSession => "validate_user_session",
            RevokeSession => "revoke_user_session",
            GrantProjectAccess => "grant_project_access",
            RevokeProjectAccess => "revoke_project_access",
            ExtendSession => "extend_user_session",
            EnqueueTask => "enqueue_task",
            DequeueTask => "dequeue_task",
            CompleteTask => "complete_task",
            FailTask => "fail_task",
            GetTaskStatus => "get_task_status",
            QueueLength => "queue_length",
            CacheAgentConfig => "cache_agent_config",
            GetAgentConfig => "get_agent_config",
        }
    }
}

/// Entry point for application code.
///
/// Cheap to clone. [`CacheManager::for_tenant`] binds a copy to one project;
/// in production every store call needs such a binding.
#[derive(Debug, Clone)]
pub struct CacheManager {
    client: Arc<ResilientStoreClient>,
    config: Arc<KvConfig>,
    tenant: Option<String>,
    invalidation: CacheInvalidationService,
    sessions: SessionManagementService,
}

impl CacheManager {
    pub fn new(client: Arc<ResilientStoreClient>, config: KvConfig) -> Self {
        let sessions = SessionManagementService::new(config.session_ttl());
        Self {
            client,
            config: Arc::new(config),
            tenant: None,
            invalidation: CacheInvalidationService::new(),
            sessions,
        }
    }

    /// Manager over a fresh process-local store.
    pub fn in_memory(config: KvConfig) -> Self {
        let client = Arc::new(ResilientStoreClient::in_memory(&config));
        Self::new(client, config)
    }

    /// Copy of this manager bound to `project_id`. Project-scoped calls for
    /// any other project are refused.
    pub fn for_tenant(&self, project_id: &str) -> CacheResult<Self> {
        let tenant = validate_uuid_segment("tenant id", project_id)?;
        Ok(Self {
            tenant: Some(tenant),
            ..self.clone()
        })
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<ResilientStoreClient> {
        &self.client
    }

    fn store(&self) -> CacheResult<TenantStore<'_>> {
        self.client.scoped(self.tenant.as_deref())
    }

    /// Refuses project ids other than the bound tenant. Returns the
    /// canonical id.
    fn ensure_project_scope(&self, project_id: &str) -> CacheResult<String> {
        let project_id = validate_uuid_segment("project_id", project_id)?;
        match &self.tenant {
            Some(tenant) if *tenant != project_id => Err(CacheError::ProjectIsolation(format!(
                "tenant {tenant} cannot access project {project_id}"
            ))),
            _ => Ok(project_id),
        }
    }

    /// Applies the operation's failure policy to store failures. Every other
    /// error propagates unchanged.
    async fn run<T, Fut>(
        &self,
        operation: ManagerOperation,
        fallback: impl FnOnce() -> T,
        body: Fut,
    ) -> CacheResult<T>
    where
        Fut: Future<Output = CacheResult<T>>,
    {
        match body.await {
            Ok(value) => Ok(value),
            Err(error) if !error.is_store_failure() => Err(error),
            Err(error) => match FailurePolicy::for_operation(operation) {
                FailurePolicy::FailHard => Err(error),
                policy => {
                    log_degraded_operation(operation.as_str(), policy.as_str(), &error.to_string());
                    Ok(fallback())
                }
            },
        }
    }

    /// Reads a JSON record, treating an undecodable payload as absent.
    async fn read_record<T: DeserializeOwned>(
        store: &TenantStore<'_>,
        key: &CacheKey,
    ) -> CacheResult<Option<T>> {
        match store.get_json(key).await {
            Err(CacheError::Serialization(reason)) => {
                warn!(key = %key, reason = %reason, "Discarding undecodable record");
                Ok(None)
            }
            other => other,
        }
    }

    async fn write_record<T: Serialize>(
        store: &TenantStore<'_>,
        key: &CacheKey,
        record: &T,
        ttl: Ttl,
    ) -> CacheResult<()> {
        store.set_json(key, record, ttl).await
    }

    // Project cache

    /// Writes `data` as the project's cached document. Returns `false` if the
    /// store is unavailable.
    pub async fn cache_project_data(
        &self,
        project_id: &str,
        data: serde_json::Value,
        ttl: Option<Ttl>,
    ) -> CacheResult<bool> {
        self.cache_project_data_with_tags(project_id, data, Vec::new(), ttl)
            .await
    }

    /// Like [`Self::cache_project_data`], attaching extra invalidation tags.
    /// Rewriting an existing document bumps its version and keeps its tags.
    pub async fn cache_project_data_with_tags(
        &self,
        project_id: &str,
        data: serde_json::Value,
        tags: Vec<CacheTag>,
        ttl: Option<Ttl>,
    ) -> CacheResult<bool> {
        let project_id = self.ensure_project_scope(project_id)?;
        let ttl = ttl.unwrap_or_else(|| self.config.project_ttl());
        let key = CacheKey::project(&project_id)?;
        let store = self.store()?;

        self.run(ManagerOperation::CacheProjectData, || false, async {
            let cached = match Self::read_record::<ProjectCache>(&store, &key).await? {
                Some(mut existing) => {
                    existing.update(data, ttl);
                    existing.with_tags(tags)
                }
                None => ProjectCache::create(&project_id, data, ttl)?.with_tags(tags),
            };

            Self::write_record(&store, &key, &cached, ttl).await?;
            self.invalidation
                .register_tags(&store, &key, &cached.tags, ttl)
                .await?;

            debug!(project_id = %project_id, version = %cached.version, "Project data cached");
            Ok(true)
        })
        .await
    }

    /// Payload of the project's cached document. `None` on miss, logical
    /// expiry, undecodable payload or store unavailability.
    pub async fn get_project_data(&self, project_id: &str) -> CacheResult<Option<serde_json::Value>> {
        Ok(self
            .get_project_cache(project_id)
            .await?
            .map(|cached| cached.data))
    }

    /// The cached document itself, after recording this read.
    pub async fn get_project_cache(&self, project_id: &str) -> CacheResult<Option<ProjectCache>> {
        let project_id = self.ensure_project_scope(project_id)?;
        let key = CacheKey::project(&project_id)?;
        let store = self.store()?;

        self.run(ManagerOperation::GetProjectData, || None, async {
            let Some(mut cached) = Self::read_record::<ProjectCache>(&store, &key).await? else {
                debug!(project_id = %project_id, "Project cache MISS");
                return Ok(None);
            };
            if !cached.is_active() {
                debug!(project_id = %project_id, status = ?cached.status(), "Project cache stale");
                return Ok(None);
            }

            cached.access();
            // Access metadata is best effort. The write only lands on a key
            // that still exists, so a concurrent invalidation is never undone.
            match store.set_json_if_exists(&key, &cached).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(project_id = %project_id, "Project cache invalidated during read");
                    return Ok(None);
                }
                Err(e) => {
                    warn!(project_id = %project_id, error = %e, "Failed to record cache access");
                }
            }

            debug!(project_id = %project_id, access_count = cached.access_count, "Project cache HIT");
            Ok(Some(cached))
        })
        .await
    }

    /// Removes the project's document and everything sharing its tags.
    pub async fn invalidate_project_cache(&self, project_id: &str, reason: &str) -> CacheResult<u64> {
        let project_id = self.ensure_project_scope(project_id)?;
        let store = self.store()?;

        self.run(
            ManagerOperation::InvalidateProjectCache,
            || 0,
            self.invalidation.invalidate_project(&store, &project_id, reason),
        )
        .await
    }

    pub async fn invalidate_by_tag(&self, tag: &str, reason: &str) -> CacheResult<u64> {
        let tag = CacheTag::new(tag)?;
        let store = self.store()?;

        self.run(
            ManagerOperation::InvalidateByTag,
            || 0,
            self.invalidation.invalidate_by_tag(&store, &tag, reason),
        )
        .await
    }

    // Rate limiting

    /// Counts one request against `identifier`'s window. Fails open when the
    /// store is unavailable. Once the limit is spent, a configured burst
    /// allowance is drawn from a separate counter for the rest of the window.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        limit_type: RateLimitType,
        config: &RateLimitConfig,
    ) -> CacheResult<RateLimitDecision> {
        config.validate()?;
        let identifier = match limit_type {
            RateLimitType::Project => self.ensure_project_scope(identifier)?,
            RateLimitType::User => identifier.to_string(),
        };
        let identifier = identifier.as_str();
        let key = CacheKey::rate_limit(limit_type, identifier, config.window)?;
        let burst_key = CacheKey::rate_limit_burst(limit_type, identifier, config.window)?;
        let store = self.store()?;

        self.run(
            ManagerOperation::CheckRateLimit,
            || RateLimitDecision::fail_open(config),
            async {
                let window = config.window.ttl().as_duration();
                let count = store.increment_window(&key, config.limit, window).await?;
                let counted =
                    RateLimit::from_store_count(identifier, limit_type, config, count.count, count.reset_in)?;

                if count.allowed {
                    return Ok(RateLimitDecision {
                        allowed: true,
                        remaining: counted.remaining(),
                        reset_at: counted.reset_time,
                        burst: false,
                    });
                }

                let burst_allowed = if config.burst > 0 {
                    store
                        .increment_window(&burst_key, config.burst, count.reset_in)
                        .await?
                        .allowed
                } else {
                    false
                };

                if !burst_allowed {
                    info!(
                        identifier = identifier,
                        limit_type = %limit_type,
                        limit = config.limit,
                        "🚦 Rate limit exceeded"
                    );
                }

                Ok(RateLimitDecision {
                    allowed: burst_allowed,
                    remaining: 0,
                    reset_at: counted.reset_time,
                    burst: burst_allowed,
                })
            },
        )
        .await
    }

    // Progress tracking

    pub async fn start_progress_tracking(&self, correlation_id: &str, total_steps: u32) -> CacheResult<bool> {
        let progress = Progress::create(correlation_id, total_steps)?;
        let key = progress.key()?;
        let store = self.store()?;

        self.run(ManagerOperation::StartProgress, || false, async {
            Self::write_record(&store, &key, &progress, self.config.progress_ttl()).await?;
            Ok(true)
        })
        .await
    }

    /// Sets the current step. Returns `false` if there is no such tracker.
    /// Trackers that already finished reject the update.
    pub async fn update_progress(&self, correlation_id: &str, step: u32, message: &str) -> CacheResult<bool> {
        self.mutate_progress(ManagerOperation::UpdateProgress, correlation_id, |progress| {
            progress.update_step(step, message)
        })
        .await
    }

    pub async fn increment_progress(&self, correlation_id: &str, message: &str) -> CacheResult<bool> {
        self.mutate_progress(ManagerOperation::UpdateProgress, correlation_id, |progress| {
            progress.increment_step(message)
        })
        .await
    }

    pub async fn complete_progress(&self, correlation_id: &str, message: &str) -> CacheResult<bool> {
        self.mutate_progress(ManagerOperation::CompleteProgress, correlation_id, |progress| {
            progress.complete(message)
        })
        .await
    }

    pub async fn fail_progress(&self, correlation_id: &str, error: &str) -> CacheResult<bool> {
        self.mutate_progress(ManagerOperation::FailProgress, correlation_id, |progress| {
            progress.fail(error)
        })
        .await
    }

    pub async fn get_progress(&self, correlation_id: &str) -> CacheResult<Option<Progress>> {
        let key = CacheKey::progress(correlation_id)?;
        let store = self.store()?;

        self.run(
            ManagerOperation::GetProgress,
            || None,
            Self::read_record(&store, &key),
        )
        .await
    }

    /// Read-modify-write. Concurrent writers to one tracker are
    /// last-writer-wins; the version bump exposes which write landed.
    async fn mutate_progress(
        &self,
        operation: ManagerOperation,
        correlation_id: &str,
        change: impl FnOnce(&mut Progress) -> CacheResult<()>,
    ) -> CacheResult<bool> {
        let key = CacheKey::progress(correlation_id)?;
        let store = self.store()?;

        self.run(operation, || false, async {
            let Some(mut progress) = Self::read_record::<Progress>(&store, &key).await? else {
                return Ok(false);
            };
            change(&mut progress)?;
            Self::write_record(&store, &key, &progress, self.config.progress_ttl()).await?;
            debug!(
                correlation_id = correlation_id,
                step = progress.current_step,
                state = ?progress.state,
                "Progress updated"
            );
            Ok(true)
        })
        .await
    }

    // Sessions

    pub async fn create_user_session(
        &self,
        user_id: &str,
        session_id: &str,
        user_data: serde_json::Value,
        project_access: Vec<String>,
        ttl: Option<Ttl>,
    ) -> CacheResult<UserSession> {
        let ttl = ttl.unwrap_or_else(|| self.sessions.session_ttl());
        let session = UserSession::create(user_id, session_id, user_data, project_access, ttl)?;
        let key = session.key()?;
        let store = self.store()?;

        Self::write_record(&store, &key, &session, ttl).await?;
        info!(session_id = %session.session_id, user_id = user_id, "🔑 User session created");
        Ok(session)
    }

    /// The session if it exists and is still valid. Validation records
    /// activity and extends sessions close to expiry. Missing, expired and
    /// revoked sessions all return `None`.
    pub async fn validate_user_session(&self, session_id: &str) -> CacheResult<Option<UserSession>> {
        let key = CacheKey::session(session_id)?;
        let store = self.store()?;

        self.run(ManagerOperation::ValidateSession, || None, async {
            let Some(mut session) = Self::read_record::<UserSession>(&store, &key).await? else {
                return Ok(None);
            };
            if self.sessions.validate(&mut session).is_none() {
                return Ok(None);
            }
            let ttl = self.sessions.storage_ttl(&session);
            Self::write_record(&store, &key, &session, ttl).await?;
            Ok(Some(session))
        })
        .await
    }

    /// Marks the session revoked. Returns `false` if it did not exist or was
    /// already inactive.
    pub async fn revoke_user_session(&self, session_id: &str, reason: &str) -> CacheResult<bool> {
        let key = CacheKey::session(session_id)?;
        let store = self.store()?;

        self.run(ManagerOperation::RevokeSession, || false, async {
            let Some(mut session) = Self::read_record::<UserSession>(&store, &key).await? else {
                return Ok(false);
            };
            let was_active = session.is_active;
            session.invalidate(reason);
            let ttl = self.sessions.storage_ttl(&session);
            Self::write_record(&store, &key, &session, ttl).await?;
            info!(session_id = %session.session_id, reason = reason, "🔒 User session revoked");
            Ok(was_active)
        })
        .await
    }

    pub async fn grant_project_access(&self, session_id: &str, project_id: &str) -> CacheResult<bool> {
        self.mutate_session(ManagerOperation::GrantProjectAccess, session_id, |sessions, session| {
            sessions.grant_access(session, project_id)
        })
        .await
    }

    pub async fn revoke_project_access(&self, session_id: &str, project_id: &str) -> CacheResult<bool> {
        self.mutate_session(ManagerOperation::RevokeProjectAccess, session_id, |_, session| {
            session.revoke_project_access(project_id)
        })
        .await
    }

    /// Extends the session within its lifetime cap. Returns `false` once the
    /// cap is reached.
    pub async fn extend_user_session(&self, session_id: &str) -> CacheResult<bool> {
        self.mutate_session(ManagerOperation::ExtendSession, session_id, |sessions, session| {
            sessions.extend(session)
        })
        .await
    }

    async fn mutate_session(
        &self,
        operation: ManagerOperation,
        session_id: &str,
        change: impl FnOnce(&SessionManagementService, &mut UserSession) -> CacheResult<bool>,
    ) -> CacheResult<bool> {
        let key = CacheKey::session(session_id)?;
        let store = self.store()?;

        self.run(operation, || false, async {
            let mut session = Self::read_record::<UserSession>(&store, &key)
                .await?
                .ok_or_else(|| CacheError::invalid_state(format!("session {session_id} not found")))?;
            let changed = change(&self.sessions, &mut session)?;
            let ttl = self.sessions.storage_ttl(&session);
            Self::write_record(&store, &key, &session, ttl).await?;
            Ok(changed)
        })
        .await
    }

    // Task queues

    /// Adds `task` to `queue`, ordered by priority then arrival. The capacity
    /// check reads three lane lengths without a lock, so concurrent producers
    /// can overshoot `queue_max_size` slightly.
    pub async fn enqueue_task(&self, queue: &str, mut task: QueuedTask) -> CacheResult<()> {
        let queue = QueueName::new(queue)?;
        let store = self.store()?;

        self.run(ManagerOperation::EnqueueTask, || (), async {
            let length = Self::lane_total(&store, &queue).await?;
            if length >= self.config.queue_max_size as u64 {
                return Err(CacheError::QueueFull {
                    queue: queue.to_string(),
                    max_size: self.config.queue_max_size,
                });
            }

            task.status = TaskStatus::Queued;
            task.updated_at = Utc::now();
            self.push_task(&store, &queue, &task).await?;
            debug!(queue = %queue, task_id = %task.task_id, priority = %task.priority, "Task enqueued");
            Ok(())
        })
        .await
    }

    /// Highest-priority task, marked processing. `None` when the queue is
    /// empty.
    pub async fn dequeue_task(&self, queue: &str) -> CacheResult<Option<QueuedTask>> {
        let queue = QueueName::new(queue)?;
        let store = self.store()?;

        self.run(ManagerOperation::DequeueTask, || None, async {
            for priority in QueuePriority::ALL {
                let lane = queue.lane_key(priority)?;
                while let Some(bytes) = store.list_pop(&lane).await? {
                    let mut task: QueuedTask = match serde_json::from_slice(&bytes) {
                        Ok(task) => task,
                        Err(e) => {
                            warn!(queue = %queue, lane = %lane, error = %e, "Dropping undecodable task");
                            continue;
                        }
                    };
                    task.start_processing()?;
                    if let Err(e) = Self::write_task_status(&store, &task).await {
                        Self::return_to_lane(&store, &lane, &bytes, &task.task_id).await;
                        return Err(e);
                    }
                    debug!(queue = %queue, task_id = %task.task_id, "Task dequeued");
                    return Ok(Some(task));
                }
            }
            Ok(None)
        })
        .await
    }

    pub async fn complete_task(&self, task: &mut QueuedTask) -> CacheResult<()> {
        let store = self.store()?;

        self.run(ManagerOperation::CompleteTask, || (), async {
            task.complete()?;
            Self::write_task_status(&store, task).await?;
            info!(task_id = %task.task_id, attempts = task.attempts, "✅ Task completed");
            Ok(())
        })
        .await
    }

    /// Records a failed attempt. A task with attempts left goes back on
    /// `queue` (capacity is not re-checked for a task already admitted) and
    /// `Ok(TaskStatus::Queued)` is returned. Otherwise the terminal status is
    /// recorded and [`CacheError::TaskTerminalFailure`] returned.
    pub async fn fail_task(&self, queue: &str, task: &mut QueuedTask, error: &str) -> CacheResult<TaskStatus> {
        let queue = QueueName::new(queue)?;
        let store = self.store()?;

        self.run(ManagerOperation::FailTask, || TaskStatus::Failed, async {
            task.record_failure(error)?;
            if task.can_retry() {
                self.push_task(&store, &queue, task).await?;
                warn!(
                    task_id = %task.task_id,
                    attempts = task.attempts,
                    max_attempts = task.max_attempts,
                    "🔁 Task failed, re-enqueued"
                );
                return Ok(task.status);
            }

            Self::write_task_status(&store, task).await?;
            warn!(task_id = %task.task_id, attempts = task.attempts, "❌ Task failed permanently");
            Err(CacheError::TaskTerminalFailure {
                task_id: task.task_id.clone(),
                attempts: task.attempts,
            })
        })
        .await
    }

    pub async fn get_task_status(&self, task_id: &str) -> CacheResult<Option<QueuedTask>> {
        let key = CacheKey::task_status(task_id)?;
        let store = self.store()?;

        self.run(
            ManagerOperation::GetTaskStatus,
            || None,
            Self::read_record(&store, &key),
        )
        .await
    }

    pub async fn queue_length(&self, queue: &str) -> CacheResult<u64> {
        let queue = QueueName::new(queue)?;
        let store = self.store()?;

        self.run(ManagerOperation::QueueLength, || 0, Self::lane_total(&store, &queue))
            .await
    }

    async fn lane_total(store: &TenantStore<'_>, queue: &QueueName) -> CacheResult<u64> {
        let mut total = 0;
        for priority in QueuePriority::ALL {
            total += store.list_len(&queue.lane_key(priority)?).await?;
        }
        Ok(total)
    }

    async fn push_task(&self, store: &TenantStore<'_>, queue: &QueueName, task: &QueuedTask) -> CacheResult<()> {
        Self::write_task_status(store, task).await?;
        let payload = serde_json::to_vec(task)?;
        store
            .list_push(&queue.lane_key(task.priority)?, &payload)
            .await?;
        Ok(())
    }

    /// Puts a popped task back at the head of its lane, unchanged, so the
    /// next dequeue sees it first.
    async fn return_to_lane(store: &TenantStore<'_>, lane: &CacheKey, payload: &[u8], task_id: &str) {
        match store.list_push_front(lane, payload).await {
            Ok(_) => warn!(lane = %lane, task_id = %task_id, "Task returned to queue after failed claim"),
            Err(e) => error!(
                lane = %lane,
                task_id = %task_id,
                error = %e,
                "Task lost: claim failed and it could not be returned to the queue"
            ),
        }
    }

    async fn write_task_status(store: &TenantStore<'_>, task: &QueuedTask) -> CacheResult<()> {
        Self::write_record(store, &task.status_key()?, task, Ttl::task_status()).await
    }

    // Agent configuration

    /// Caches an agent's configuration for the longest allowed TTL.
    pub async fn cache_agent_config(&self, name: &str, config: &serde_json::Value) -> CacheResult<bool> {
        let key = CacheKey::agent_config(name)?;
        let store = self.store()?;

        self.run(ManagerOperation::CacheAgentConfig, || false, async {
            Self::write_record(&store, &key, config, Ttl::max()).await?;
            Ok(true)
        })
        .await
    }

    pub async fn get_agent_config(&self, name: &str) -> CacheResult<Option<serde_json::Value>> {
        let key = CacheKey::agent_config(name)?;
        let store = self.store()?;

        self.run(
            ManagerOperation::GetAgentConfig,
            || None,
            Self::read_record(&store, &key),
        )
        .await
    }

    // Operations

    pub async fn health_check(&self) -> HealthReport {
        self.client.health_check().await
    }

    pub fn metrics(&self) -> ClientMetricsSnapshot {
        self.client.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::models::RateWindow;
    use crate::store::InMemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn manager_with(backend: Arc<InMemoryStore>) -> CacheManager {
        let config = KvConfig::for_testing();
        let client = Arc::new(ResilientStoreClient::new(backend, &config));
        CacheManager::new(client, config)
    }

    fn project_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[test]
    fn test_policy_table() {
        assert_eq!(
            FailurePolicy::for_operation(ManagerOperation::CheckRateLimit),
            FailurePolicy::FailOpen
        );
        for op in [
            ManagerOperation::CacheProjectData,
            ManagerOperation::GetProjectData,
            ManagerOperation::GetProgress,
            ManagerOperation::GetAgentConfig,
        ] {
            assert_eq!(FailurePolicy::for_operation(op), FailurePolicy::FailSoft, "{op:?}");
        }
        for op in [
            ManagerOperation::CreateSession,
            ManagerOperation::ValidateSession,
            ManagerOperation::EnqueueTask,
            ManagerOperation::DequeueTask,
        ] {
            assert_eq!(FailurePolicy::for_operation(op), FailurePolicy::FailHard, "{op:?}");
        }
    }

    #[tokio::test]
    async fn test_rewrite_bumps_version_and_counts_reads() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));
        let id = project_id();

        assert!(manager.cache_project_data(&id, json!({"v": 1}), None).await.unwrap());
        assert!(manager.cache_project_data(&id, json!({"v": 2}), None).await.unwrap());

        let first = manager.get_project_cache(&id).await.unwrap().unwrap();
        assert_eq!(first.data, json!({"v": 2}));
        assert_eq!(first.version.value(), 2);
        assert_eq!(first.access_count, 1);

        let second = manager.get_project_cache(&id).await.unwrap().unwrap();
        assert_eq!(second.access_count, 2);
    }

    #[tokio::test]
    async fn test_fail_soft_when_store_down() {
        let backend = Arc::new(InMemoryStore::new());
        let manager = manager_with(Arc::clone(&backend));
        backend.set_available(false);

        let id = project_id();
        assert!(!manager.cache_project_data(&id, json!({}), None).await.unwrap());
        assert_eq!(manager.get_project_data(&id).await.unwrap(), None);
        assert!(!manager.start_progress_tracking("wf-1", 3).await.unwrap());
        assert_eq!(manager.invalidate_by_tag("team", "test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_validation_errors_surface_under_fail_soft() {
        let backend = Arc::new(InMemoryStore::new());
        let manager = manager_with(Arc::clone(&backend));
        backend.set_available(false);

        let result = manager.cache_project_data("not-a-uuid", json!({}), None).await;
        assert!(matches!(result, Err(CacheError::Validation(_))));
    }

    #[tokio::test]
    async fn test_fail_hard_when_store_down() {
        let backend = Arc::new(InMemoryStore::new());
        let manager = manager_with(Arc::clone(&backend));
        backend.set_available(false);

        let task = QueuedTask::new("t-1", "embed", json!({})).unwrap();
        let result = manager.enqueue_task("embeddings", task).await;
        assert!(matches!(result, Err(CacheError::TransientStore(_))));

        let result = manager.validate_user_session(&Uuid::new_v4().to_string()).await;
        assert!(matches!(result, Err(CacheError::TransientStore(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_fails_open() {
        let backend = Arc::new(InMemoryStore::new());
        let manager = manager_with(Arc::clone(&backend));
        backend.set_available(false);

        let config = RateLimitConfig::new(5, RateWindow::Minute).unwrap();
        let decision = manager
            .check_rate_limit("user-1", RateLimitType::User, &config)
            .await
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 5);
    }

    #[tokio::test]
    async fn test_burst_allowance_after_limit() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));
        let config = RateLimitConfig::new(2, RateWindow::Minute)
            .unwrap()
            .with_burst(1);

        for _ in 0..2 {
            let decision = manager
                .check_rate_limit("user-1", RateLimitType::User, &config)
                .await
                .unwrap();
            assert!(decision.allowed);
            assert!(!decision.burst);
        }

        let burst = manager
            .check_rate_limit("user-1", RateLimitType::User, &config)
            .await
            .unwrap();
        assert!(burst.allowed);
        assert!(burst.burst);
        assert_eq!(burst.remaining, 0);

        let denied = manager
            .check_rate_limit("user-1", RateLimitType::User, &config)
            .await
            .unwrap();
        assert!(!denied.allowed);
    }

    #[tokio::test]
    async fn test_tenant_cannot_touch_foreign_project() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));
        let own = project_id();
        let scoped = manager.for_tenant(&own).unwrap();

        assert!(scoped.cache_project_data(&own, json!({}), None).await.unwrap());
        let result = scoped.cache_project_data(&project_id(), json!({}), None).await;
        assert!(matches!(result, Err(CacheError::ProjectIsolation(_))));

        let config = RateLimitConfig::new(5, RateWindow::Minute).unwrap();
        let result = scoped
            .check_rate_limit(&project_id(), RateLimitType::Project, &config)
            .await;
        assert!(matches!(result, Err(CacheError::ProjectIsolation(_))));
    }

    #[tokio::test]
    async fn test_production_requires_tenant_binding() {
        let config = KvConfig {
            environment: Environment::Production,
            ..KvConfig::for_testing()
        };
        let manager = CacheManager::in_memory(config);

        let result = manager.get_agent_config("planner").await;
        assert!(matches!(result, Err(CacheError::ProjectIsolation(_))));

        let scoped = manager.for_tenant(&project_id()).unwrap();
        assert!(scoped.cache_agent_config("planner", &json!({"model": "x"})).await.unwrap());
        assert_eq!(
            scoped.get_agent_config("planner").await.unwrap(),
            Some(json!({"model": "x"}))
        );
    }

    #[tokio::test]
    async fn test_progress_on_missing_tracker_reports_false() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));
        assert!(!manager.update_progress("missing", 1, "step").await.unwrap());
    }

    #[tokio::test]
    async fn test_finished_progress_rejects_updates() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));
        assert!(manager.start_progress_tracking("wf-2", 2).await.unwrap());
        assert!(manager.complete_progress("wf-2", "done").await.unwrap());

        let result = manager.update_progress("wf-2", 1, "late").await;
        assert!(matches!(result, Err(CacheError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_task_retries_then_fails_terminally() {
        let manager = manager_with(Arc::new(InMemoryStore::new()));
        let task = QueuedTask::new("t-9", "export", json!({}))
            .unwrap()
            .with_max_attempts(2)
            .unwrap();
        manager.enqueue_task("exports", task).await.unwrap();

        let mut task = manager.dequeue_task("exports").await.unwrap().unwrap();
        let status = manager.fail_task("exports", &mut task, "boom").await.unwrap();
        assert_eq!(status, TaskStatus::Queued);
        assert_eq!(manager.queue_length("exports").await.unwrap(), 1);

        let mut task = manager.dequeue_task("exports").await.unwrap().unwrap();
        let result = manager.fail_task("exports", &mut task, "boom again").await;
        assert!(matches!(
            result,
            Err(CacheError::TaskTerminalFailure { attempts: 2, .. })
        ));

        let stored = manager.get_task_status("t-9").await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(manager.queue_length("exports").await.unwrap(), 0);
    }
}
