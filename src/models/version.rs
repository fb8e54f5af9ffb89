use crate::constants::keys::MAX_TAG_LENGTH;
use crate::error::{CacheError, CacheResult};
use crate::validation::validate_segment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optimistic-versioning counter. Starts at 1 and only moves forward.
///
/// Used to detect that a record changed between a read and a later
/// observation; it does not resolve conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersion(u64);

impl CacheVersion {
    pub const fn initial() -> Self {
        Self(1)
    }

    pub fn new(value: u64) -> CacheResult<Self> {
        if value == 0 {
            return Err(CacheError::validation("cache version starts at 1"));
        }
        Ok(Self(value))
    }

    /// Saturates at `u64::MAX`, which no realistic write count reaches.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn is_newer_than(&self, other: &CacheVersion) -> bool {
        self.0 > other.0
    }
}

impl Default for CacheVersion {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Grouping label for bulk invalidation. Never used for access control.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheTag(String);

impl CacheTag {
    pub fn new(value: impl Into<String>) -> CacheResult<Self> {
        let value = value.into();
        validate_segment("cache tag", &value)?;
        if value.chars().count() > MAX_TAG_LENGTH {
            return Err(CacheError::validation(format!(
                "cache tag '{value}' exceeds {MAX_TAG_LENGTH} characters"
            )));
        }
        Ok(Self(value))
    }

    /// The tag every cached document of a project carries.
    pub fn for_project(project_id: &str) -> CacheResult<Self> {
        Self::new(format!("project:{project_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CacheTag {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheTag> for String {
    fn from(tag: CacheTag) -> Self {
        tag.0
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
