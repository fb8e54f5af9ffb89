//! In-process store backed by `DashMap`.
//!
//! Mirrors the subset of Redis semantics the key-value layer relies on:
//! per-key TTLs with lazy expiry, atomic single-key updates (each update runs
//! under the key's shard lock), FIFO lists and string sets. Also exposes
//! fault injection so retry, circuit breaking and the per-operation failure
//! policies can be exercised without a real backend.

use super::errors::{StoreError, StoreResult};
use super::traits::{KeyValueStore, MemoryInfo, WindowCount};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
enum StoredValue {
    Bytes(Vec<u8>),
    Counter(u64),
    List(VecDeque<Vec<u8>>),
    Set(BTreeSet<String>),
}

impl StoredValue {
    fn approximate_size(&self) -> u64 {
        let bytes = match self {
            Self::Bytes(b) => b.len(),
            Self::Counter(_) => std::mem::size_of::<u64>(),
            Self::List(items) => items.iter().map(Vec::len).sum(),
            Self::Set(members) => members.iter().map(String::len).sum(),
        };
        bytes as u64
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

/// In-memory [`KeyValueStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    entries: DashMap<String, StoredEntry>,
    max_bytes: Option<u64>,
    available: AtomicBool,
    failures_remaining: AtomicU32,
    latency_millis: AtomicU64,
    operations: AtomicU64,
    failing_prefix: RwLock<Option<String>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            max_bytes: None,
            available: AtomicBool::new(true),
            failures_remaining: AtomicU32::new(0),
            latency_millis: AtomicU64::new(0),
            operations: AtomicU64::new(0),
            failing_prefix: RwLock::new(None),
        }
    }

    /// Reports `max_bytes` as the memory cap in [`KeyValueStore::memory_info`].
    pub fn with_capacity_bytes(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            ..Self::new()
        }
    }

    /// Makes every call fail with a connection error until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fails the next `count` calls with a connection error.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Fails every call on keys starting with `prefix` with a connection
    /// error. `None` clears it.
    pub fn fail_keys_with_prefix(&self, prefix: Option<&str>) {
        *self.failing_prefix.write() = prefix.map(str::to_string);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_millis
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of calls that reached the store, including injected failures.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Live key count (expired entries are purged first).
    pub fn len(&self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    async fn enter(&self, operation: &str, key: &str) -> StoreResult<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_millis.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "{operation} {key}: store unavailable"
            )));
        }

        let prefix_blocked = self
            .failing_prefix
            .read()
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if prefix_blocked {
            return Err(StoreError::Connection(format!(
                "{operation} {key}: injected failure for key prefix"
            )));
        }

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Connection(format!(
                "{operation} {key}: injected failure"
            )));
        }

        Ok(())
    }

    /// Runs `f` against the live entry for `key`, if any. Expired entries are
    /// removed and reported as absent.
    fn read<R>(&self, key: &str, f: impl FnOnce(&StoredEntry) -> R) -> Option<R> {
        let now = Instant::now();
        {
            if let Some(entry) = self.entries.get(key) {
                if !entry.is_expired(now) {
                    return Some(f(&entry));
                }
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Runs `f` on the entry for `key` under its shard lock, replacing a
    /// missing or expired entry with `init()` first.
    fn update<R>(
        &self,
        key: &str,
        init: impl Fn() -> StoredEntry,
        f: impl FnOnce(&mut StoredEntry) -> R,
    ) -> R {
        let now = Instant::now();
        let mut slot = self.entries.entry(key.to_string()).or_insert_with(&init);
        if slot.is_expired(now) {
            *slot = init();
        }
        f(&mut slot)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.enter("GET", key).await?;
        let value = self.read(key, |entry| match &entry.value {
            StoredValue::Bytes(bytes) => Ok(bytes.clone()),
            StoredValue::Counter(count) => Ok(count.to_string().into_bytes()),
            _ => Err(StoreError::WrongType(key.to_string())),
        });
        let result = value.transpose()?;
        debug!(key = key, hit = result.is_some(), "Store GET (memory)");
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.enter("SET", key).await?;
        self.entries.insert(
            key.to_string(),
            StoredEntry::new(StoredValue::Bytes(value.to_vec()), Some(ttl)),
        );
        debug!(key = key, ttl_seconds = ttl.as_secs(), "Store SET (memory)");
        Ok(())
    }

    async fn set_if_exists(&self, key: &str, value: &[u8]) -> StoreResult<bool> {
        self.enter("SET_XX", key).await?;
        let now = Instant::now();
        let written = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.value = StoredValue::Bytes(value.to_vec());
                true
            }
            _ => false,
        };
        debug!(key = key, written = written, "Store SET XX (memory)");
        Ok(written)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.enter("DEL", key).await?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn increment_window(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> StoreResult<WindowCount> {
        self.enter("INCR_WINDOW", key).await?;
        let now = Instant::now();
        self.update(
            key,
            || StoredEntry::new(StoredValue::Counter(0), Some(window)),
            |entry| {
                let reset_in = entry.remaining(now).unwrap_or(window);
                match &mut entry.value {
                    StoredValue::Counter(count) => {
                        let allowed = *count < limit;
                        if allowed {
                            *count += 1;
                        }
                        Ok(WindowCount {
                            count: *count,
                            allowed,
                            reset_in,
                        })
                    }
                    _ => Err(StoreError::WrongType(key.to_string())),
                }
            },
        )
    }

    async fn list_push(&self, key: &str, value: &[u8]) -> StoreResult<u64> {
        self.enter("RPUSH", key).await?;
        self.update(
            key,
            || StoredEntry::new(StoredValue::List(VecDeque::new()), None),
            |entry| match &mut entry.value {
                StoredValue::List(items) => {
                    items.push_back(value.to_vec());
                    Ok(items.len() as u64)
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        )
    }

    async fn list_push_front(&self, key: &str, value: &[u8]) -> StoreResult<u64> {
        self.enter("LPUSH", key).await?;
        self.update(
            key,
            || StoredEntry::new(StoredValue::List(VecDeque::new()), None),
            |entry| match &mut entry.value {
                StoredValue::List(items) => {
                    items.push_front(value.to_vec());
                    Ok(items.len() as u64)
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        )
    }

    async fn list_pop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.enter("LPOP", key).await?;
        let now = Instant::now();
        let popped = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => match &mut entry.value {
                StoredValue::List(items) => items.pop_front(),
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
            _ => None,
        };
        self.entries.remove_if(key, |_, entry| {
            entry.is_expired(now) || matches!(&entry.value, StoredValue::List(items) if items.is_empty())
        });
        Ok(popped)
    }

    async fn list_len(&self, key: &str) -> StoreResult<u64> {
        self.enter("LLEN", key).await?;
        self.read(key, |entry| match &entry.value {
            StoredValue::List(items) => Ok(items.len() as u64),
            _ => Err(StoreError::WrongType(key.to_string())),
        })
        .unwrap_or(Ok(0))
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool> {
        self.enter("SADD", key).await?;
        let now = Instant::now();
        self.update(
            key,
            || StoredEntry::new(StoredValue::Set(BTreeSet::new()), Some(ttl)),
            |entry| {
                let extended = now + ttl;
                if entry.expires_at.is_some_and(|at| at < extended) {
                    entry.expires_at = Some(extended);
                }
                match &mut entry.value {
                    StoredValue::Set(members) => Ok(members.insert(member.to_string())),
                    _ => Err(StoreError::WrongType(key.to_string())),
                }
            },
        )
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        self.enter("SMEMBERS", key).await?;
        self.read(key, |entry| match &entry.value {
            StoredValue::Set(members) => Ok(members.iter().cloned().collect()),
            _ => Err(StoreError::WrongType(key.to_string())),
        })
        .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.enter("SREM", key).await?;
        let now = Instant::now();
        let removed = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => match &mut entry.value {
                StoredValue::Set(members) => members.remove(member),
                _ => return Err(StoreError::WrongType(key.to_string())),
            },
            _ => false,
        };
        self.entries.remove_if(key, |_, entry| {
            entry.is_expired(now) || matches!(&entry.value, StoredValue::Set(members) if members.is_empty())
        });
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.enter("PING", "").await
    }

    async fn memory_info(&self) -> StoreResult<MemoryInfo> {
        self.enter("INFO", "memory").await?;
        let now = Instant::now();
        let used_bytes = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| entry.key().len() as u64 + entry.value().value.approximate_size())
            .sum();
        Ok(MemoryInfo {
            used_bytes,
            max_bytes: self.max_bytes,
        })
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
