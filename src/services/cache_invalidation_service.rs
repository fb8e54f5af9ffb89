//! Tag-based bulk invalidation.
//!
//! Every tagged write records its key in the set `cache_tag:{tag}`.
//! Invalidating a tag enumerates that set and deletes the members one by
//! one, so a reader racing the enumeration may still see a stale hit.

use crate::client::TenantStore;
use crate::error::CacheResult;
use crate::models::{CacheKey, CacheTag, KeyKind, ProjectCache, Ttl};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct CacheInvalidationService;

impl CacheInvalidationService {
    pub fn new() -> Self {
        Self
    }

    /// Records `key` under each of `tags`. Index entries live at least as
    /// long as the key they point to.
    pub async fn register_tags(
        &self,
        store: &TenantStore<'_>,
        key: &CacheKey,
        tags: &BTreeSet<CacheTag>,
        ttl: Ttl,
    ) -> CacheResult<()> {
        for tag in tags {
            let index = CacheKey::tag_index(tag)?;
            store.set_add(&index, key.as_str(), ttl).await?;
        }
        debug!(key = %key, tags = tags.len(), "Registered cache tags");
        Ok(())
    }

    /// Removes the project's cached document plus every key recorded under
    /// any of its tags. Returns the number of keys actually removed.
    pub async fn invalidate_project(
        &self,
        store: &TenantStore<'_>,
        project_id: &str,
        reason: &str,
    ) -> CacheResult<u64> {
        let key = CacheKey::project(project_id)?;
        let mut tags: BTreeSet<CacheTag> = BTreeSet::new();
        tags.insert(CacheTag::for_project(key.owner())?);

        // An unreadable record still gets deleted; only its extra tags are lost
        match store.get_json::<ProjectCache>(&key).await {
            Ok(Some(cached)) => tags.extend(cached.tags),
            Ok(None) => {}
            Err(e) if e.is_store_failure() => return Err(e),
            Err(e) => warn!(key = %key, error = %e, "Unreadable project cache during invalidation"),
        }

        let mut removed = u64::from(store.delete(&key).await?);
        for tag in &tags {
            removed += self.invalidate_by_tag(store, tag, reason).await?;
        }

        info!(
            project_id = key.owner(),
            reason = reason,
            removed = removed,
            "🗑️ Project cache invalidated"
        );
        Ok(removed)
    }

    /// Deletes every key recorded under `tag`, then the index itself.
    ///
    /// A handle scoped to a tenant only removes project documents owned by
    /// that tenant; foreign members are left in place.
    pub async fn invalidate_by_tag(
        &self,
        store: &TenantStore<'_>,
        tag: &CacheTag,
        reason: &str,
    ) -> CacheResult<u64> {
        let index = CacheKey::tag_index(tag)?;
        let members = store.set_members(&index).await?;

        let mut targets = Vec::with_capacity(members.len());
        let mut foreign = Vec::new();
        for member in members {
            match CacheKey::parse(&member) {
                Ok(key) if Self::is_foreign(store, &key) => foreign.push(member),
                Ok(key) => targets.push(key),
                Err(e) => {
                    warn!(tag = %tag, member = %member, error = %e, "Dropping malformed tag index entry");
                    store.set_remove(&index, &member).await?;
                }
            }
        }

        let outcomes = join_all(targets.iter().map(|key| store.delete(key))).await;
        let mut removed = 0;
        for outcome in outcomes {
            if outcome? {
                removed += 1;
            }
        }

        if foreign.is_empty() {
            store.delete(&index).await?;
        } else {
            for member in &targets {
                store.set_remove(&index, member.as_str()).await?;
            }
            warn!(tag = %tag, skipped = foreign.len(), "Tag spans other tenants; their keys were kept");
        }

        debug!(tag = %tag, reason = reason, removed = removed, "Tag invalidated");
        Ok(removed)
    }

    fn is_foreign(store: &TenantStore<'_>, key: &CacheKey) -> bool {
        match store.tenant() {
            Some(tenant) => key.kind() == KeyKind::Project && !key.owner().eq_ignore_ascii_case(tenant),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResilientStoreClient;
    use crate::config::KvConfig;

    const PROJECT_A: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";
    const PROJECT_B: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";

    async fn seed(store: &TenantStore<'_>, project_id: &str, tags: &[&str]) -> CacheKey {
        let cached = ProjectCache::create(project_id, serde_json::json!({"v": 1}), Ttl::project_data())
            .unwrap()
            .with_tags(tags.iter().map(|t| CacheTag::new(*t).unwrap()));
        let key = cached.key().unwrap();
        store.set_json(&key, &cached, Ttl::project_data()).await.unwrap();
        CacheInvalidationService::new()
            .register_tags(store, &key, &cached.tags, Ttl::project_data())
            .await
            .unwrap();
        key
    }

    #[tokio::test]
    async fn test_invalidate_project_removes_document() {
        let client = ResilientStoreClient::in_memory(&KvConfig::for_testing());
        let store = client.scoped(None).unwrap();
        let key = seed(&store, PROJECT_A, &[]).await;

        let service = CacheInvalidationService::new();
        assert_eq!(service.invalidate_project(&store, PROJECT_A, "update").await.unwrap(), 1);
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(service.invalidate_project(&store, PROJECT_A, "update").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_by_shared_tag() {
        let client = ResilientStoreClient::in_memory(&KvConfig::for_testing());
        let store = client.scoped(None).unwrap();
        let a = seed(&store, PROJECT_A, &["pricing"]).await;
        let b = seed(&store, PROJECT_B, &["pricing"]).await;

        let tag = CacheTag::new("pricing").unwrap();
        let removed = CacheInvalidationService::new()
            .invalidate_by_tag(&store, &tag, "price change")
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get(&a).await.unwrap(), None);
        assert_eq!(store.get(&b).await.unwrap(), None);
        assert!(store
            .set_members(&CacheKey::tag_index(&tag).unwrap())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_tenant_scoped_invalidation_keeps_foreign_keys() {
        let client = ResilientStoreClient::in_memory(&KvConfig::for_testing());
        let admin = client.scoped(None).unwrap();
        seed(&admin, PROJECT_A, &["pricing"]).await;
        let b = seed(&admin, PROJECT_B, &["pricing"]).await;

        let tenant_a = client.scoped(Some(PROJECT_A)).unwrap();
        let tag = CacheTag::new("pricing").unwrap();
        let removed = CacheInvalidationService::new()
            .invalidate_by_tag(&tenant_a, &tag, "price change")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(admin.get(&b).await.unwrap().is_some());
        assert_eq!(
            admin.set_members(&CacheKey::tag_index(&tag).unwrap()).await.unwrap(),
            vec![b.as_str().to_string()]
        );
    }
}
