//! Ephemeral authentication context with per-project grants.

use crate::error::{CacheError, CacheResult};
use crate::models::{CacheKey, Ttl};
use crate::validation::{validate_segment, validate_uuid_segment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub session_id: String,
    pub user_data: serde_json::Value,
    pub project_access: BTreeSet<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<String>,
}

impl UserSession {
    pub fn create(
        user_id: &str,
        session_id: &str,
        user_data: serde_json::Value,
        project_access: impl IntoIterator<Item = String>,
        ttl: Ttl,
    ) -> CacheResult<Self> {
        validate_segment("user_id", user_id)?;
        let session_id = validate_uuid_segment("session_id", session_id)?;
        let project_access = project_access
            .into_iter()
            .map(|id| validate_uuid_segment("project_id", &id))
            .collect::<CacheResult<BTreeSet<_>>>()?;
        let now = Utc::now();

        Ok(Self {
            user_id: user_id.to_string(),
            session_id,
            user_data,
            project_access,
            is_active: true,
            created_at: now,
            last_activity_at: now,
            expires_at: now + ttl.as_chrono(),
            revoked_reason: None,
        })
    }

    pub fn key(&self) -> CacheResult<CacheKey> {
        CacheKey::session(&self.session_id)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }

    /// `Some(self)` while the session is usable.
    pub fn validate(&self) -> Option<&Self> {
        self.is_valid().then_some(self)
    }

    pub fn has_project_access(&self, project_id: &str) -> bool {
        validate_uuid_segment("project_id", project_id)
            .map(|id| self.project_access.contains(&id))
            .unwrap_or(false)
    }

    /// Returns `true` if the grant was new.
    pub fn grant_project_access(&mut self, project_id: &str) -> CacheResult<bool> {
        self.ensure_active("grant project access")?;
        let project_id = validate_uuid_segment("project_id", project_id)?;
        Ok(self.project_access.insert(project_id))
    }

    /// Returns `true` if a grant was removed.
    pub fn revoke_project_access(&mut self, project_id: &str) -> CacheResult<bool> {
        let project_id = validate_uuid_segment("project_id", project_id)?;
        Ok(self.project_access.remove(&project_id))
    }

    /// Pushes expiry to `now + ttl`. Never moves it backwards.
    pub fn extend_session(&mut self, ttl: Ttl) -> CacheResult<()> {
        self.ensure_active("extend session")?;
        let now = Utc::now();
        let proposed = now + ttl.as_chrono();
        if proposed > self.expires_at {
            self.expires_at = proposed;
        }
        self.last_activity_at = now;
        Ok(())
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Terminal: an invalidated session never becomes valid again.
    pub fn invalidate(&mut self, reason: impl Into<String>) {
        self.is_active = false;
        self.revoked_reason = Some(reason.into());
    }

    pub fn remaining(&self) -> chrono::Duration {
        (self.expires_at - Utc::now()).max(chrono::Duration::zero())
    }

    fn ensure_active(&self, action: &str) -> CacheResult<()> {
        if !self.is_valid() {
            return Err(CacheError::invalid_state(format!(
                "cannot {action}: session {} is no longer valid",
                self.session_id
            )));
        }
        Ok(())
    }
}
