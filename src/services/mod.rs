//! Domain services layered over the store client.

pub mod cache_invalidation_service;
pub mod session_management_service;

pub use cache_invalidation_service::CacheInvalidationService;
pub use session_management_service::SessionManagementService;
