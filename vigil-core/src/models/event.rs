//! Risk event record

use crate::models::risk::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of synthetic batch ids minted for fast-path events
pub const FAST_PATH_PREFIX: &str = "fast_path_";

/// Build the synthetic batch id for a fast-path detection
pub fn fast_path_batch_id(detection_id: i64) -> String {
    format!("{FAST_PATH_PREFIX}{detection_id}")
}

/// A persisted risk assessment for one closed batch (or fast-path detection)
///
/// `batch_id` is the idempotency key: at most one live event exists per
/// batch id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub batch_id: String,
    pub camera_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub reasoning: String,
    pub reviewed: bool,
    pub is_fast_path: bool,
    /// Prompt sent to the LLM, kept for replay and debugging
    pub llm_prompt: Option<String>,
    /// Legacy denormalized detection id list; the junction table is
    /// authoritative
    pub detection_ids: Vec<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Whether this event carries a soft-delete tombstone
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Insertable event, before an id is assigned
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub batch_id: String,
    pub camera_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub reasoning: String,
    pub is_fast_path: bool,
    pub llm_prompt: Option<String>,
    pub detection_ids: Vec<i64>,
}

/// Junction row linking an event to a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDetection {
    pub event_id: i64,
    pub detection_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_id_has_expected_shape() {
        assert_eq!(fast_path_batch_id(42), "fast_path_42");
        assert!(fast_path_batch_id(7).starts_with(FAST_PATH_PREFIX));
    }
}
