//! Deterministic, namespaced key construction.
//!
//! Every key embeds the id of the tenant, session, task or workflow that owns
//! it, so two owners can never address the same physical key. Keys can only
//! be built through the per-kind constructors below (or re-validated through
//! [`CacheKey::parse`] when read back from a tag index).

use crate::constants::keys;
use crate::error::{CacheError, CacheResult};
use crate::models::{CacheTag, QueuePriority, RateLimitType, RateWindow};
use crate::validation::{validate_segment, validate_uuid_segment};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kind a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Project,
    Session,
    RateLimit,
    AgentConfig,
    Progress,
    TaskStatus,
    QueueLane,
    TagIndex,
    HealthProbe,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    kind: KeyKind,
    owner: String,
    value: String,
}

impl CacheKey {
    /// `project:{projectId}:data`
    pub fn project(project_id: &str) -> CacheResult<Self> {
        let project_id = validate_uuid_segment("project_id", project_id)?;
        let value = format!("{}:{project_id}:data", keys::PROJECT_PREFIX);
        Self::build(KeyKind::Project, project_id, value)
    }

    /// `session:{sessionId}`
    pub fn session(session_id: &str) -> CacheResult<Self> {
        let session_id = validate_uuid_segment("session_id", session_id)?;
        let value = format!("{}:{session_id}", keys::SESSION_PREFIX);
        Self::build(KeyKind::Session, session_id, value)
    }

    /// `rate_limit:{type}:{identifier}:{windowSeconds}s`
    pub fn rate_limit(
        limit_type: RateLimitType,
        identifier: &str,
        window: RateWindow,
    ) -> CacheResult<Self> {
        validate_segment("identifier", identifier)?;
        let value = format!(
            "{}:{limit_type}:{identifier}:{}s",
            keys::RATE_LIMIT_PREFIX,
            window.seconds()
        );
        Self::build(KeyKind::RateLimit, identifier.to_string(), value)
    }

    /// Soft burst counter paired with a rate limit key.
    pub fn rate_limit_burst(
        limit_type: RateLimitType,
        identifier: &str,
        window: RateWindow,
    ) -> CacheResult<Self> {
        let base = Self::rate_limit(limit_type, identifier, window)?;
        let value = format!("{}:burst", base.value);
        Self::build(KeyKind::RateLimit, base.owner, value)
    }

    /// `agent:{name}:config`
    pub fn agent_config(name: &str) -> CacheResult<Self> {
        validate_segment("agent name", name)?;
        let value = format!("{}:{name}:config", keys::AGENT_PREFIX);
        Self::build(KeyKind::AgentConfig, name.to_string(), value)
    }

    /// `progress:{correlationId}`
    pub fn progress(correlation_id: &str) -> CacheResult<Self> {
        validate_segment("correlation_id", correlation_id)?;
        let value = format!("{}:{correlation_id}", keys::PROGRESS_PREFIX);
        Self::build(KeyKind::Progress, correlation_id.to_string(), value)
    }

    /// `task:{taskId}:status`
    pub fn task_status(task_id: &str) -> CacheResult<Self> {
        validate_segment("task_id", task_id)?;
        let value = format!("{}:{task_id}:status", keys::TASK_PREFIX);
        Self::build(KeyKind::TaskStatus, task_id.to_string(), value)
    }

    /// `queue:{name}:{priority}`, one FIFO lane per priority band.
    pub fn queue_lane(queue_name: &str, priority: QueuePriority) -> CacheResult<Self> {
        validate_segment("queue name", queue_name)?;
        let value = format!("{}:{queue_name}:{priority}", keys::QUEUE_PREFIX);
        Self::build(KeyKind::QueueLane, queue_name.to_string(), value)
    }

    /// `cache_tag:{tag}`, the set of keys carrying a tag.
    pub fn tag_index(tag: &CacheTag) -> CacheResult<Self> {
        let value = format!("{}:{tag}", keys::TAG_PREFIX);
        Self::build(KeyKind::TagIndex, tag.to_string(), value)
    }

    pub fn health_probe(probe_id: &str) -> CacheResult<Self> {
        validate_segment("probe_id", probe_id)?;
        let value = format!("{}:{probe_id}", keys::HEALTH_PROBE_PREFIX);
        Self::build(KeyKind::HealthProbe, probe_id.to_string(), value)
    }

    /// Re-validates a raw key read back from the store (tag index members).
    ///
    /// Only kinds that can carry tags are accepted.
    pub fn parse(raw: &str) -> CacheResult<Self> {
        let mut parts = raw.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(keys::PROJECT_PREFIX), Some(id), Some("data"), None) => Self::project(id),
            (Some(keys::AGENT_PREFIX), Some(name), Some("config"), None) => {
                Self::agent_config(name)
            }
            (Some(keys::PROGRESS_PREFIX), Some(id), None, None) => Self::progress(id),
            (Some(keys::TASK_PREFIX), Some(id), Some("status"), None) => Self::task_status(id),
            _ => Err(CacheError::validation(format!(
                "'{}' is not a recognised taggable key",
                raw.escape_debug()
            ))),
        }
    }

    fn build(kind: KeyKind, owner: String, value: String) -> CacheResult<Self> {
        if value.len() > keys::MAX_KEY_LENGTH {
            return Err(CacheError::validation(format!(
                "key exceeds {} characters ({} given)",
                keys::MAX_KEY_LENGTH,
                value.len()
            )));
        }
        Ok(Self { kind, owner, value })
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// The id that owns this key (project, session, task, workflow...).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = "6f9619ff-8b86-d011-b42d-00c04fc964ff";

    #[test]
    fn test_templates() {
        assert_eq!(
            CacheKey::project(PROJECT).unwrap().as_str(),
            format!("project:{PROJECT}:data")
        );
        assert_eq!(
            CacheKey::session(PROJECT).unwrap().as_str(),
            format!("session:{PROJECT}")
        );
        assert_eq!(
            CacheKey::rate_limit(RateLimitType::User, "u-42", RateWindow::Minute)
                .unwrap()
                .as_str(),
            "rate_limit:user:u-42:60s"
        );
        assert_eq!(
            CacheKey::agent_config("planner").unwrap().as_str(),
            "agent:planner:config"
        );
        assert_eq!(
            CacheKey::progress("corr-1").unwrap().as_str(),
            "progress:corr-1"
        );
        assert_eq!(
            CacheKey::task_status("t1").unwrap().as_str(),
            "task:t1:status"
        );
        assert_eq!(
            CacheKey::queue_lane("exports", QueuePriority::High)
                .unwrap()
                .as_str(),
            "queue:exports:high"
        );
    }

    #[test]
    fn test_rejects_malformed_uuid_and_whitespace() {
        assert!(CacheKey::project("P").is_err());
        assert!(CacheKey::session("").is_err());
        assert!(CacheKey::progress("corr 1").is_err());
        assert!(CacheKey::task_status("").is_err());
    }

    #[test]
    fn test_rejects_oversized_key() {
        let name = "a".repeat(245);
        assert!(CacheKey::agent_config(&name).is_err());
        let name = "a".repeat(237);
        assert_eq!(CacheKey::agent_config(&name).unwrap().as_str().len(), 250);
    }

    #[test]
    fn test_owner_is_tenant_segment() {
        let key = CacheKey::project(PROJECT).unwrap();
        assert_eq!(key.owner(), PROJECT);
        assert_eq!(key.kind(), KeyKind::Project);
    }

    #[test]
    fn test_parse_round_trips_taggable_keys() {
        let key = CacheKey::project(PROJECT).unwrap();
        assert_eq!(CacheKey::parse(key.as_str()).unwrap(), key);
        assert!(CacheKey::parse("session:whatever").is_err());
        assert!(CacheKey::parse("project:P:data").is_err());
    }
}
