mod common;

use common::strategies::*;
use proptest::prelude::*;
use serde_json::json;
use tasker_kv::models::{QueueName, TaskQueue};
use tasker_kv::{CacheKey, CacheVersion, QueuedTask, Ttl};

proptest! {
    /// Property: every TTL inside the accepted range constructs and round-trips its seconds
    #[test]
    fn ttl_in_range_is_accepted(seconds in valid_ttl_seconds_strategy()) {
        let ttl = Ttl::from_seconds(seconds);
        prop_assert!(ttl.is_ok());
        prop_assert_eq!(ttl.unwrap().seconds(), seconds);
    }

    /// Property: zero and anything past one year is rejected
    #[test]
    fn ttl_out_of_range_is_rejected(seconds in invalid_ttl_seconds_strategy()) {
        prop_assert!(Ttl::from_seconds(seconds).is_err());
    }

    /// Property: successive versions strictly increase
    #[test]
    fn versions_strictly_increase(steps in 1usize..200) {
        let mut version = CacheVersion::initial();
        for _ in 0..steps {
            let next = version.next();
            prop_assert!(next.is_newer_than(&version));
            prop_assert_eq!(next.value(), version.value() + 1);
            version = next;
        }
    }

    /// Property: dequeue order is priority first, then arrival order
    #[test]
    fn queue_orders_by_priority_then_fifo(priorities in priority_sequence_strategy()) {
        let name = QueueName::new("embeddings").unwrap();
        let mut queue = TaskQueue::new(name, 1_000).unwrap();
        for (index, priority) in priorities.iter().enumerate() {
            let task = QueuedTask::new(&format!("t-{index}"), "embed", json!({}))
                .unwrap()
                .with_priority(*priority);
            queue.enqueue(task).unwrap();
        }

        let mut drained = Vec::new();
        while let Some(task) = queue.dequeue() {
            let index: usize = task.task_id.trim_start_matches("t-").parse().unwrap();
            drained.push((task.priority.lane(), index));
        }

        let mut expected = drained.clone();
        expected.sort();
        prop_assert_eq!(drained.len(), priorities.len());
        prop_assert_eq!(drained, expected);
    }

    /// Property: accepted identifiers always produce keys inside the progress namespace
    #[test]
    fn progress_keys_embed_identifier(id in identifier_strategy()) {
        let key = CacheKey::progress(&id).unwrap();
        prop_assert_eq!(key.as_str(), format!("progress:{id}"));
        prop_assert_eq!(key.owner(), id.as_str());
    }
}
