//! Progress of a multi-step operation keyed by correlation id.
//!
//! `active -> completed` forces `current_step = total_steps`; `active ->
//! failed` records the error. Both are terminal and reject further step
//! updates.

use crate::error::{CacheError, CacheResult};
use crate::models::{CacheKey, CacheVersion};
use crate::validation::{validate_positive, validate_segment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Active,
    Completed,
    Failed,
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMessage {
    pub step: u32,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub correlation_id: String,
    pub total_steps: u32,
    pub current_step: u32,
    pub message: Option<String>,
    pub step_messages: Vec<StepMessage>,
    pub state: ProgressState,
    pub version: CacheVersion,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Progress {
    pub fn create(correlation_id: &str, total_steps: u32) -> CacheResult<Self> {
        validate_segment("correlation_id", correlation_id)?;
        validate_positive("total_steps", u64::from(total_steps))?;
        let now = Utc::now();
        Ok(Self {
            correlation_id: correlation_id.to_string(),
            total_steps,
            current_step: 0,
            message: None,
            step_messages: Vec::new(),
            state: ProgressState::Active,
            version: CacheVersion::initial(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
        })
    }

    pub fn key(&self) -> CacheResult<CacheKey> {
        CacheKey::progress(&self.correlation_id)
    }

    /// Moves to an explicit step. Steps may not exceed `total_steps`.
    pub fn update_step(&mut self, step: u32, message: impl Into<String>) -> CacheResult<()> {
        self.ensure_active("update step")?;
        if step > self.total_steps {
            return Err(CacheError::validation(format!(
                "step {step} exceeds total steps {}",
                self.total_steps
            )));
        }
        self.record(step, message.into());
        Ok(())
    }

    pub fn increment_step(&mut self, message: impl Into<String>) -> CacheResult<()> {
        let next = self.current_step.saturating_add(1);
        self.update_step(next, message)
    }

    pub fn complete(&mut self, message: impl Into<String>) -> CacheResult<()> {
        self.ensure_active("complete")?;
        let total = self.total_steps;
        self.record(total, message.into());
        self.state = ProgressState::Completed;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> CacheResult<()> {
        self.ensure_active("fail")?;
        self.error_message = Some(error.into());
        self.state = ProgressState::Failed;
        self.touch();
        Ok(())
    }

    pub fn percentage(&self) -> f64 {
        if self.state == ProgressState::Completed {
            return 100.0;
        }
        f64::from(self.current_step) / f64::from(self.total_steps) * 100.0
    }

    pub fn is_active(&self) -> bool {
        self.state == ProgressState::Active
    }

    pub fn is_completed(&self) -> bool {
        self.state == ProgressState::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.state == ProgressState::Failed
    }

    fn record(&mut self, step: u32, message: String) {
        self.current_step = step;
        self.step_messages.push(StepMessage {
            step,
            message: message.clone(),
            recorded_at: Utc::now(),
        });
        self.message = Some(message);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version = self.version.next();
    }

    fn ensure_active(&self, action: &str) -> CacheResult<()> {
        if !self.is_active() {
            return Err(CacheError::invalid_state(format!(
                "cannot {action}: progress {} is already {}",
                self.correlation_id, self.state
            )));
        }
        Ok(())
    }
}
