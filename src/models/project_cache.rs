//! Cached snapshot of one tenant's document.

use crate::error::CacheResult;
use crate::models::{CacheKey, CacheTag, CacheVersion, Ttl};
use crate::validation::validate_uuid_segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    Active,
    Expired,
    Invalidated,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Invalidated => write!(f, "INVALIDATED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCache {
    pub project_id: String,
    pub data: serde_json::Value,
    pub version: CacheVersion,
    /// Always contains the project's own tag.
    pub tags: BTreeSet<CacheTag>,
    pub access_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    invalidated: bool,
}

impl ProjectCache {
    pub fn create(project_id: &str, data: serde_json::Value, ttl: Ttl) -> CacheResult<Self> {
        let project_id = validate_uuid_segment("project_id", project_id)?;
        let now = Utc::now();
        let mut tags = BTreeSet::new();
        tags.insert(CacheTag::for_project(&project_id)?);

        Ok(Self {
            project_id,
            data,
            version: CacheVersion::initial(),
            tags,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            expires_at: now + ttl.as_chrono(),
            invalidated: false,
        })
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = CacheTag>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn key(&self) -> CacheResult<CacheKey> {
        CacheKey::project(&self.project_id)
    }

    /// Records a read.
    pub fn access(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = Some(Utc::now());
    }

    /// Replaces the payload and bumps the version. Expiry is reset to `ttl`
    /// from now.
    pub fn update(&mut self, data: serde_json::Value, ttl: Ttl) {
        self.data = data;
        self.version = self.version.next();
        self.expires_at = Utc::now() + ttl.as_chrono();
        self.invalidated = false;
    }

    /// Forces immediate logical expiry. The status becomes `INVALIDATED`.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
        self.expires_at = Utc::now();
    }

    pub fn status(&self) -> CacheStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CacheStatus {
        if self.invalidated {
            CacheStatus::Invalidated
        } else if now > self.expires_at {
            CacheStatus::Expired
        } else {
            CacheStatus::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == CacheStatus::Active
    }

    pub fn has_tag(&self, tag: &CacheTag) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PROJECT: &str = "6f9619ff-8b86-d011-b42d-00c04fc964ff";

    #[test]
    fn test_create_carries_project_tag() {
        let cache = ProjectCache::create(PROJECT, json!({"title": "X"}), Ttl::project_data()).unwrap();
        assert_eq!(cache.version, CacheVersion::initial());
        assert!(cache.has_tag(&CacheTag::for_project(PROJECT).unwrap()));
        assert_eq!(cache.status(), CacheStatus::Active);
        assert_eq!(cache.access_count, 0);
    }

    #[test]
    fn test_access_increments_counter() {
        let mut cache = ProjectCache::create(PROJECT, json!({}), Ttl::project_data()).unwrap();
        cache.access();
        cache.access();
        assert_eq!(cache.access_count, 2);
        assert!(cache.last_accessed_at.is_some());
    }

    #[test]
    fn test_invalidate_differs_from_expiry() {
        let mut cache = ProjectCache::create(PROJECT, json!({}), Ttl::project_data()).unwrap();
        let later = cache.expires_at + chrono::Duration::seconds(1);
        assert_eq!(cache.status_at(later), CacheStatus::Expired);

        cache.invalidate();
        assert_eq!(cache.status(), CacheStatus::Invalidated);
        assert_eq!(cache.status_at(later), CacheStatus::Invalidated);
    }

    #[test]
    fn test_update_bumps_version() {
        let mut cache = ProjectCache::create(PROJECT, json!({"a": 1}), Ttl::project_data()).unwrap();
        cache.update(json!({"a": 2}), Ttl::project_data());
        assert_eq!(cache.version.value(), 2);
        assert_eq!(cache.data, json!({"a": 2}));
    }

    #[test]
    fn test_serialization_preserves_data_version_and_tags() {
        let extra = CacheTag::new("reports").unwrap();
        let cache = ProjectCache::create(PROJECT, json!({"title": "X", "n": [1, 2]}), Ttl::project_data())
            .unwrap()
            .with_tags([extra]);
        let bytes = serde_json::to_vec(&cache).unwrap();
        let restored: ProjectCache = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.data, cache.data);
        assert_eq!(restored.version, cache.version);
        assert_eq!(restored.tags, cache.tags);
    }

    #[test]
    fn test_rejects_malformed_project_id() {
        assert!(ProjectCache::create("P", json!({}), Ttl::project_data()).is_err());
    }
}
