//! Store error types

use thiserror::Error;

/// Failures raised by a [`super::KeyValueStore`] backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Could not reach the backend
    #[error("Store connection error: {0}")]
    Connection(String),

    /// Call exceeded the transport timeout
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// Client-side circuit breaker is rejecting calls
    #[error("Store circuit open: {0}")]
    CircuitOpen(String),

    /// Backend rejected the command
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Key holds a value of another type
    #[error("Wrong value type at key {0}")]
    WrongType(String),
}

impl StoreError {
    /// Network, timeout and circuit-open failures may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::CircuitOpen(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
