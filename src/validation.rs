//! Input validation shared by key construction and the manager façade.
//!
//! Every check here runs before any store access so malformed input never
//! reaches the backend.

use crate::error::{CacheError, CacheResult};
use uuid::Uuid;

/// Characters that would turn a key segment into a SCAN glob pattern.
const GLOB_CHARACTERS: &[char] = &['*', '?', '[', ']'];

/// Validates a free-form key segment (identifiers, correlation ids, names).
pub fn validate_segment(field: &str, value: &str) -> CacheResult<()> {
    if value.is_empty() {
        return Err(CacheError::validation(format!("{field} cannot be empty")));
    }

    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CacheError::validation(format!(
            "{field} '{}' must not contain whitespace or control characters",
            value.escape_debug()
        )));
    }

    if value.contains(GLOB_CHARACTERS) {
        return Err(CacheError::validation(format!(
            "{field} '{value}' must not contain glob characters (*, ?, [, ])"
        )));
    }

    Ok(())
}

/// Validates a segment that must be a well-formed UUID.
///
/// Returns the canonical hyphenated lowercase form so that `ABC…` and
/// `abc…` address the same key.
pub fn validate_uuid_segment(field: &str, value: &str) -> CacheResult<String> {
    validate_segment(field, value)?;
    Uuid::parse_str(value)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|e| CacheError::validation(format!("{field} '{value}' is not a valid UUID: {e}")))
}

pub fn validate_positive(field: &str, value: u64) -> CacheResult<()> {
    if value == 0 {
        return Err(CacheError::validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}
