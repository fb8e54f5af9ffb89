use proptest::prelude::*;
use tasker_kv::QueuePriority;

/// Seconds inside the accepted TTL range.
pub fn valid_ttl_seconds_strategy() -> impl Strategy<Value = u64> {
    1u64..=31_536_000
}

/// Seconds outside the accepted TTL range.
pub fn invalid_ttl_seconds_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![Just(0u64), 31_536_001u64..u64::MAX]
}

pub fn priority_strategy() -> impl Strategy<Value = QueuePriority> {
    prop_oneof![
        Just(QueuePriority::High),
        Just(QueuePriority::Normal),
        Just(QueuePriority::Low),
    ]
}

pub fn priority_sequence_strategy() -> impl Strategy<Value = Vec<QueuePriority>> {
    prop::collection::vec(priority_strategy(), 0..40)
}

/// Key segments the validators accept.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,31}"
}
