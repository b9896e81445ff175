//! Key-value store key families
//!
//! All pipeline state in the key-value store lives under these families:
//!
//! - `batch:{camera_id}:current` — active batch id for a camera
//! - `batch:{batch_id}:camera_id|started_at|last_activity|detections`
//! - `queue:{name}` and `queue:dlq:{name}` (owned by the store impl)
//! - `idempotency:event:{batch_id}` — event-created markers
//! - pub-sub channel `security_events`

/// Name of the analysis work queue
pub const ANALYSIS_QUEUE: &str = "analysis_queue";

/// Pub-sub channel risk events are broadcast on
pub const EVENTS_CHANNEL: &str = "security_events";

/// Scan pattern matching every camera's current-batch key
pub const CURRENT_BATCH_PATTERN: &str = "batch:*:current";

/// Reserved prefix for idempotency markers
pub const IDEMPOTENCY_PREFIX: &str = "idempotency:event:";

/// Current-batch pointer for a camera
pub fn batch_current_key(camera_id: &str) -> String {
    format!("batch:{camera_id}:current")
}

/// Owning camera of a batch
pub fn batch_camera_key(batch_id: &str) -> String {
    format!("batch:{batch_id}:camera_id")
}

/// Batch start timestamp (float seconds since epoch)
pub fn batch_started_key(batch_id: &str) -> String {
    format!("batch:{batch_id}:started_at")
}

/// Batch last-activity timestamp (float seconds since epoch)
pub fn batch_activity_key(batch_id: &str) -> String {
    format!("batch:{batch_id}:last_activity")
}

/// Batch detection-id list
pub fn batch_detections_key(batch_id: &str) -> String {
    format!("batch:{batch_id}:detections")
}

/// Idempotency marker recording the event created for a batch
pub fn idempotency_key(batch_id: &str) -> String {
    format!("{IDEMPOTENCY_PREFIX}{batch_id}")
}

/// Dead-letter sibling of a queue name
pub fn dlq_name(queue: &str) -> String {
    format!("dlq:{queue}")
}

/// Extract the camera id from a `batch:{camera_id}:current` key
pub fn camera_id_from_current_key(key: &str) -> Option<&str> {
    key.strip_prefix("batch:")?.strip_suffix(":current")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_families_match_wire_format() {
        assert_eq!(batch_current_key("front_door"), "batch:front_door:current");
        assert_eq!(batch_camera_key("abc"), "batch:abc:camera_id");
        assert_eq!(batch_started_key("abc"), "batch:abc:started_at");
        assert_eq!(batch_activity_key("abc"), "batch:abc:last_activity");
        assert_eq!(batch_detections_key("abc"), "batch:abc:detections");
        assert_eq!(idempotency_key("abc"), "idempotency:event:abc");
        assert_eq!(dlq_name("analysis_queue"), "dlq:analysis_queue");
    }

    #[test]
    fn camera_id_round_trips_through_current_key() {
        let key = batch_current_key("side_gate");
        assert_eq!(camera_id_from_current_key(&key), Some("side_gate"));
        assert_eq!(camera_id_from_current_key("batch:x:started_at"), None);
        assert_eq!(camera_id_from_current_key("other:x:current"), None);
    }
}
