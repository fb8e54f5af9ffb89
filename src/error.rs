//! Error types for the key-value layer.
//!
//! `ValidationError` and `ProjectIsolation` always reach the caller. Store
//! failures arrive here only after retries are exhausted; what happens next
//! is decided per operation by [`crate::manager::FailurePolicy`].

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Project isolation violation: {0}")]
    ProjectIsolation(String),
    #[error("Store unavailable: {0}")]
    TransientStore(String),
    #[error("Queue {queue} is full (max size {max_size})")]
    QueueFull { queue: String, max_size: usize },
    #[error("Task {task_id} failed permanently after {attempts} attempts")]
    TaskTerminalFailure { task_id: String, attempts: u32 },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

impl From<StoreError> for CacheError {
    fn from(error: StoreError) -> Self {
        CacheError::TransientStore(error.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for CacheError {
    fn from(error: config::ConfigError) -> Self {
        CacheError::Configuration(error.to_string())
    }
}

pub type CacheResult<T> = anyhow::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_become_transient() {
        let error: CacheError = StoreError::Timeout("GET project:x:data".to_string()).into();
        assert!(error.is_store_failure());
    }

    #[test]
    fn test_validation_and_isolation_are_not_store_failures() {
        assert!(!CacheError::validation("empty identifier").is_store_failure());
        assert!(!CacheError::ProjectIsolation("missing tenant".to_string()).is_store_failure());
    }

    #[test]
    fn test_queue_full_message() {
        let error = CacheError::QueueFull {
            queue: "embeddings".to_string(),
            max_size: 10,
        };
        assert_eq!(error.to_string(), "Queue embeddings is full (max size 10)");
    }
}
