//! Session validation and extension policy.
//!
//! Sessions slide: activity close to expiry pushes `expires_at` forward by
//! the configured session TTL, but never past an absolute lifetime measured
//! from creation.

use crate::constants::sessions;
use crate::error::{CacheError, CacheResult};
use crate::models::{Ttl, UserSession};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SessionManagementService {
    session_ttl: Ttl,
    extend_threshold: Duration,
    max_lifetime: Duration,
    max_project_grants: usize,
}

impl Default for SessionManagementService {
    fn default() -> Self {
        Self::new(Ttl::session())
    }
}

impl SessionManagementService {
    pub fn new(session_ttl: Ttl) -> Self {
        Self {
            session_ttl,
            extend_threshold: Duration::seconds(sessions::EXTEND_THRESHOLD_SECONDS),
            max_lifetime: Duration::seconds(sessions::MAX_LIFETIME_SECONDS),
            max_project_grants: sessions::MAX_PROJECT_GRANTS,
        }
    }

    pub fn with_extend_threshold(mut self, threshold: Duration) -> Self {
        self.extend_threshold = threshold;
        self
    }

    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }

    pub fn session_ttl(&self) -> Ttl {
        self.session_ttl
    }

    /// Records activity on a valid session and extends it when it is close
    /// to expiry. Returns `None` for revoked or expired sessions.
    pub fn validate(&self, session: &mut UserSession) -> Option<()> {
        if !session.is_valid() {
            return None;
        }
        session.touch();
        if self.should_extend_at(session, Utc::now()) {
            // Cannot fail: the session was checked valid above
            let _ = self.extend(session);
        }
        Some(())
    }

    pub fn should_extend_at(&self, session: &UserSession, now: DateTime<Utc>) -> bool {
        session.is_valid_at(now)
            && session.expires_at - now < self.extend_threshold
            && self.extension_ttl_at(session, now).is_some()
    }

    /// TTL for the next extension, capped by the absolute lifetime.
    /// `None` when the session has no lifetime left to grant.
    pub fn extension_ttl_at(&self, session: &UserSession, now: DateTime<Utc>) -> Option<Ttl> {
        let hard_limit = session.created_at + self.max_lifetime;
        let proposed = now + self.session_ttl.as_chrono();
        let target = proposed.min(hard_limit);
        if target - session.expires_at < Duration::seconds(1) {
            return None;
        }
        let seconds = (target - now).num_seconds();
        u64::try_from(seconds)
            .ok()
            .and_then(|seconds| Ttl::from_seconds(seconds).ok())
    }

    /// Extends `session` within the lifetime cap. Returns `false` when the
    /// cap has been reached.
    pub fn extend(&self, session: &mut UserSession) -> CacheResult<bool> {
        if !session.is_valid() {
            return Err(CacheError::invalid_state(format!(
                "cannot extend session {}: no longer valid",
                session.session_id
            )));
        }
        match self.extension_ttl_at(session, Utc::now()) {
            Some(ttl) => {
                session.extend_session(ttl)?;
                debug!(
                    session_id = %session.session_id,
                    expires_at = %session.expires_at,
                    "Session extended"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Grants access to `project_id`, enforcing the per-session grant cap.
    pub fn grant_access(&self, session: &mut UserSession, project_id: &str) -> CacheResult<bool> {
        if session.project_access.len() >= self.max_project_grants
            && !session.has_project_access(project_id)
        {
            return Err(CacheError::validation(format!(
                "session {} already holds the maximum of {} project grants",
                session.session_id, self.max_project_grants
            )));
        }
        session.grant_project_access(project_id)
    }

    /// Time the store should keep the record: what is left of the session.
    pub fn storage_ttl(&self, session: &UserSession) -> Ttl {
        u64::try_from(session.remaining().num_seconds())
            .ok()
            .and_then(|seconds| Ttl::from_seconds(seconds).ok())
            .unwrap_or_else(|| Ttl::from_seconds(1).unwrap_or(self.session_ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = "9b2f1c3e-5d4a-4e6f-8a7b-1c2d3e4f5a6b";
    const PROJECT: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    fn session(ttl_seconds: u64) -> UserSession {
        UserSession::create(
            "user-1",
            SESSION,
            serde_json::json!({}),
            Vec::new(),
            Ttl::from_seconds(ttl_seconds).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_extends_only_near_expiry() {
        let service = SessionManagementService::default();
        let now = Utc::now();
        assert!(!service.should_extend_at(&session(7_200), now));
        assert!(service.should_extend_at(&session(600), now));
    }

    #[test]
    fn test_validate_extends_near_expiry() {
        let service = SessionManagementService::default();
        let mut near = session(600);
        let before = near.expires_at;
        assert!(service.validate(&mut near).is_some());
        assert!(near.expires_at > before);
    }

    #[test]
    fn test_extension_respects_lifetime_cap() {
        let service = SessionManagementService::default().with_max_lifetime(Duration::seconds(900));
        let mut near = session(600);
        assert!(service.extend(&mut near).unwrap());
        let cap = near.created_at + Duration::seconds(900);
        assert!(near.expires_at <= cap);
        assert!(!service.extend(&mut near).unwrap());
    }

    #[test]
    fn test_revoked_session_is_not_validated_or_extended() {
        let service = SessionManagementService::default();
        let mut revoked = session(600);
        revoked.invalidate("logout");
        assert!(service.validate(&mut revoked).is_none());
        assert!(service.extend(&mut revoked).is_err());
    }

    #[test]
    fn test_grant_cap() {
        let mut service = SessionManagementService::default();
        service.max_project_grants = 1;
        let mut s = session(600);
        assert!(service.grant_access(&mut s, PROJECT).unwrap());
        assert!(!service.grant_access(&mut s, PROJECT).unwrap());
        let other = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
        assert!(matches!(
            service.grant_access(&mut s, other),
            Err(CacheError::Validation(_))
        ));
    }

    #[test]
    fn test_storage_ttl_tracks_remaining_lifetime() {
        let service = SessionManagementService::default();
        let ttl = service.storage_ttl(&session(600));
        assert!(ttl.seconds() <= 600 && ttl.seconds() >= 598);
    }
}
