//! Key-value store trait definition

use super::errors::StoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of an atomic fixed-window increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCount {
    /// Requests counted in the current window, including this one if allowed.
    pub count: u64,
    pub allowed: bool,
    /// Time until the window rolls over.
    pub reset_in: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub used_bytes: u64,
    /// `None` when the backend runs without a memory cap.
    pub max_bytes: Option<u64>,
}

/// Operations the key-value layer needs from the shared store.
///
/// Implemented by [`super::InMemoryStore`] and, behind the `store-redis`
/// feature, `RedisStore`. Single-key operations must be atomic at the
/// backend; nothing here spans more than one key.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// `Ok(None)` on miss.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Overwrites the value of a live key, keeping its TTL. Never creates the
    /// key. Returns `false` if it was absent.
    async fn set_if_exists(&self, key: &str, value: &[u8]) -> StoreResult<bool>;

    /// Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Increments the counter at `key` only if it is below `limit`, creating
    /// it with expiry `window` when absent or expired.
    async fn increment_window(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> StoreResult<WindowCount>;

    /// Appends to the tail of a list. Returns the new length.
    async fn list_push(&self, key: &str, value: &[u8]) -> StoreResult<u64>;

    /// Prepends to the head of a list, so it is popped next. Returns the new
    /// length.
    async fn list_push_front(&self, key: &str, value: &[u8]) -> StoreResult<u64>;

    /// Removes from the head of a list.
    async fn list_pop(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn list_len(&self, key: &str) -> StoreResult<u64>;

    /// Adds a member and extends the set's expiry to at least `ttl`.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;

    async fn memory_info(&self) -> StoreResult<MemoryInfo>;

    fn provider_name(&self) -> &'static str;
}
