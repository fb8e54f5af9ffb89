//! # Store Layer
//!
//! Backend abstraction for the key-value layer. Everything above this module
//! talks to a [`KeyValueStore`] trait object; the concrete backend is chosen
//! at construction time.
//!
//! ## Backends
//!
//! - **memory**: `DashMap` with lazy expiry and fault injection. Process-local.
//! - **redis** (feature `store-redis`): shared across processes through
//!   `ConnectionManager`.
//!
//! Backends only report raw failures. Retry, timeouts and circuit breaking
//! live in [`crate::client::ResilientStoreClient`].

pub mod errors;
pub mod memory;
#[cfg(feature = "store-redis")]
pub mod redis;
pub mod traits;

pub use errors::{StoreError, StoreResult};
pub use memory::InMemoryStore;
#[cfg(feature = "store-redis")]
pub use redis::RedisStore;
pub use traits::{KeyValueStore, MemoryInfo, WindowCount};
