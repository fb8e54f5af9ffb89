//! Bounded priority queue and the lifecycle of a queued task.
//!
//! Ordering is kept as three FIFO lanes (HIGH, NORMAL, LOW). Dequeue pops
//! the first non-empty lane, so tasks leave by priority and, within a
//! priority band, in the order they arrived.

use crate::constants::queues;
use crate::error::{CacheError, CacheResult};
use crate::models::{CacheKey, QueuePriority};
use crate::validation::{validate_positive, validate_segment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Queue name restricted to the configured allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: &str) -> CacheResult<Self> {
        if !queues::ALLOWED.contains(&name) {
            return Err(CacheError::validation(format!(
                "queue '{name}' is not one of {:?}",
                queues::ALLOWED
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn lane_key(&self, priority: QueuePriority) -> CacheResult<CacheKey> {
        CacheKey::queue_lane(&self.0, priority)
    }
}

impl TryFrom<String> for QueueName {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub priority: QueuePriority,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(task_id: &str, task_type: &str, payload: serde_json::Value) -> CacheResult<Self> {
        validate_segment("task_id", task_id)?;
        validate_segment("task_type", task_type)?;
        let now = Utc::now();
        Ok(Self {
            task_id: task_id.to_string(),
            task_type: task_type.to_string(),
            payload,
            priority: QueuePriority::default(),
            status: TaskStatus::Queued,
            attempts: 0,
            max_attempts: queues::DEFAULT_MAX_ATTEMPTS,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn with_priority(mut self, priority: QueuePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> CacheResult<Self> {
        validate_positive("max_attempts", u64::from(max_attempts))?;
        self.max_attempts = max_attempts;
        Ok(self)
    }

    pub fn status_key(&self) -> CacheResult<CacheKey> {
        CacheKey::task_status(&self.task_id)
    }

    pub fn start_processing(&mut self) -> CacheResult<()> {
        if self.status != TaskStatus::Queued {
            return Err(self.illegal_transition(TaskStatus::Processing));
        }
        self.transition(TaskStatus::Processing);
        Ok(())
    }

    pub fn complete(&mut self) -> CacheResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal_transition(TaskStatus::Completed));
        }
        self.error_message = None;
        self.transition(TaskStatus::Completed);
        Ok(())
    }

    /// Counts one failed attempt. Once `attempts == max_attempts` the task is
    /// terminally `failed`; before that it returns to `queued`.
    pub fn record_failure(&mut self, error: impl Into<String>) -> CacheResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal_transition(TaskStatus::Failed));
        }
        self.attempts = self.attempts.saturating_add(1);
        self.error_message = Some(error.into());
        if self.attempts >= self.max_attempts {
            self.transition(TaskStatus::Failed);
        } else {
            self.transition(TaskStatus::Queued);
        }
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        !self.status.is_terminal() && self.attempts < self.max_attempts
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    fn transition(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    fn illegal_transition(&self, to: TaskStatus) -> CacheError {
        CacheError::invalid_state(format!(
            "task {} cannot move from {} to {to}",
            self.task_id, self.status
        ))
    }
}

/// In-process bounded priority queue.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    name: QueueName,
    max_size: usize,
    lanes: [VecDeque<QueuedTask>; 3],
}

impl TaskQueue {
    pub fn new(name: QueueName, max_size: usize) -> CacheResult<Self> {
        validate_positive("max_size", max_size as u64)?;
        Ok(Self {
            name,
            max_size,
            lanes: Default::default(),
        })
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_size
    }

    pub fn enqueue(&mut self, task: QueuedTask) -> CacheResult<()> {
        if self.is_full() {
            return Err(CacheError::QueueFull {
                queue: self.name.to_string(),
                max_size: self.max_size,
            });
        }
        self.lanes[task.priority.lane()].push_back(task);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<QueuedTask> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }

    pub fn peek(&self) -> Option<&QueuedTask> {
        self.lanes.iter().find_map(VecDeque::front)
    }

    /// Linear scan, meant for inspection rather than the hot path.
    pub fn get_tasks_by_status(&self, status: TaskStatus) -> Vec<&QueuedTask> {
        self.lanes
            .iter()
            .flat_map(VecDeque::iter)
            .filter(|task| task.status == status)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: &str, priority: QueuePriority) -> QueuedTask {
        QueuedTask::new(id, "embed", json!({"id": id}))
            .unwrap()
            .with_priority(priority)
    }

    fn queue(max_size: usize) -> TaskQueue {
        TaskQueue::new(QueueName::new(queues::EMBEDDINGS).unwrap(), max_size).unwrap()
    }

    #[test]
    fn test_priority_then_fifo_order() {
        let mut queue = queue(10);
        queue.enqueue(task("a", QueuePriority::Low)).unwrap();
        queue.enqueue(task("b", QueuePriority::High)).unwrap();
        queue.enqueue(task("c", QueuePriority::Normal)).unwrap();
        queue.enqueue(task("d", QueuePriority::High)).unwrap();

        let order: Vec<(String, QueuePriority)> = std::iter::from_fn(|| queue.dequeue())
            .map(|t| (t.task_id, t.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                ("b".to_string(), QueuePriority::High),
                ("d".to_string(), QueuePriority::High),
                ("c".to_string(), QueuePriority::Normal),
                ("a".to_string(), QueuePriority::Low),
            ]
        );
    }

    #[test]
    fn test_full_queue_rejects() {
        let mut queue = queue(1);
        queue.enqueue(task("t1", QueuePriority::High)).unwrap();
        let err = queue.enqueue(task("t2", QueuePriority::High)).unwrap_err();
        assert!(matches!(err, CacheError::QueueFull { max_size: 1, .. }));
        assert_eq!(queue.dequeue().unwrap().task_id, "t1");
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = queue(5);
        assert!(queue.peek().is_none());
        queue.enqueue(task("t1", QueuePriority::Normal)).unwrap();
        assert_eq!(queue.peek().unwrap().task_id, "t1");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_tasks_by_status() {
        let mut queue = queue(5);
        let mut processing = task("p", QueuePriority::Normal);
        processing.start_processing().unwrap();
        queue.enqueue(processing).unwrap();
        queue.enqueue(task("q", QueuePriority::Normal)).unwrap();
        let found = queue.get_tasks_by_status(TaskStatus::Processing);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].task_id, "p");
    }

    #[test]
    fn test_retry_budget() {
        let mut task = task("t", QueuePriority::Normal).with_max_attempts(3).unwrap();
        task.record_failure("boom").unwrap();
        task.record_failure("boom").unwrap();
        assert!(task.can_retry());
        assert!(!task.is_failed());
        task.record_failure("boom").unwrap();
        assert!(!task.can_retry());
        assert!(task.is_failed());
        assert!(task.record_failure("again").is_err());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut task = task("t", QueuePriority::High);
        task.start_processing().unwrap();
        assert!(task.start_processing().is_err());
        task.complete().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(!task.can_retry());
        assert!(task.complete().is_err());
    }

    #[test]
    fn test_queue_name_allow_list() {
        assert!(QueueName::new("agent_tasks").is_ok());
        assert!(QueueName::new("exports").is_ok());
        assert!(QueueName::new("anything").is_err());
    }
}
