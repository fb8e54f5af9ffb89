#![allow(dead_code)]

pub mod strategies;

use std::sync::Arc;
use tasker_kv::{CacheManager, InMemoryStore, KvConfig, ResilientStoreClient};
use uuid::Uuid;

/// Manager over a fresh in-memory store plus a handle on the store for
/// fault injection.
pub fn manager_with_store(config: KvConfig) -> (CacheManager, Arc<InMemoryStore>) {
    let backend = Arc::new(InMemoryStore::new());
    let client = Arc::new(ResilientStoreClient::new(backend.clone(), &config));
    (CacheManager::new(client, config), backend)
}

pub fn test_manager() -> (CacheManager, Arc<InMemoryStore>) {
    manager_with_store(KvConfig::for_testing())
}

pub fn new_project_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tasker_kv=debug")
        .with_test_writer()
        .try_init();
}
