//! Queue item types and overflow semantics
//!
//! The analysis queue is an external FIFO with typed items. Producers pick
//! an overflow policy; the store reports what it did so callers can log
//! warnings without failing the happy path.

use serde::{Deserialize, Serialize};

/// What a bounded queue does when a push would exceed its capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Move the oldest items to the dead-letter queue to make room
    Dlq,
    /// Fail the push
    Reject,
    /// Silently drop the oldest items
    DropOldest,
}

/// Structured result of a guarded queue push
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueuePushResult {
    pub success: bool,
    /// Queue length after the push
    pub queue_length: u64,
    /// Items dropped (DropOldest policy)
    pub dropped_count: u64,
    /// Items moved to the dead-letter queue (Dlq policy)
    pub moved_to_dlq_count: u64,
    pub error: Option<String>,
    pub warning: Option<String>,
}

impl QueuePushResult {
    /// Successful push with no overflow action
    pub fn ok(queue_length: u64) -> Self {
        Self {
            success: true,
            queue_length,
            ..Default::default()
        }
    }
}

/// Work item enqueued when a batch closes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisQueueItem {
    pub batch_id: String,
    pub camera_id: String,
    pub detection_ids: Vec<i64>,
    /// Seconds since epoch at enqueue time
    pub timestamp: f64,
    /// Delivery attempts so far; bumped by the worker on requeue
    #[serde(default)]
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_item_round_trips() {
        let item = AnalysisQueueItem {
            batch_id: "b1".into(),
            camera_id: "front_door".into(),
            detection_ids: vec![1, 2, 3],
            timestamp: 1_700_000_000.5,
            attempt: 0,
        };
        let json = serde_json::to_string(&item).unwrap();
        let back: AnalysisQueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.batch_id, "b1");
        assert_eq!(back.detection_ids, vec![1, 2, 3]);
    }

    #[test]
    fn attempt_defaults_to_zero_for_legacy_items() {
        let json = r#"{"batch_id":"b1","camera_id":"c1","detection_ids":[7],"timestamp":1.0}"#;
        let item: AnalysisQueueItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.attempt, 0);
    }
}
