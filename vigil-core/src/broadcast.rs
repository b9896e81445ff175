//! Event broadcast envelope
//!
//! Subscribers on the `security_events` channel (the WebSocket fan-out
//! collaborator among them) receive `{type: "event", data: {...}}` and
//! forward it as-is. Delivery is at-least-once; consumers deduplicate by
//! `event_id`.

use crate::models::Event;
use serde_json::{json, Value};

/// Build the canonical broadcast envelope for an event
pub fn event_envelope(event: &Event) -> Value {
    json!({
        "type": "event",
        "data": {
            "id": event.id,
            // Legacy field kept for older subscribers
            "event_id": event.id,
            "batch_id": event.batch_id,
            "camera_id": event.camera_id,
            "risk_score": event.risk_score,
            "risk_level": event.risk_level.as_str(),
            "summary": event.summary,
            "reasoning": event.reasoning,
            "started_at": event.started_at.to_rfc3339(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use chrono::Utc;

    #[test]
    fn envelope_has_canonical_shape() {
        let now = Utc::now();
        let event = Event {
            id: 12,
            batch_id: "b1".into(),
            camera_id: "front_door".into(),
            started_at: now,
            ended_at: now,
            risk_score: 75,
            risk_level: RiskLevel::High,
            summary: "Person at entrance".into(),
            reasoning: "…".into(),
            reviewed: false,
            is_fast_path: false,
            llm_prompt: None,
            detection_ids: vec![1],
            deleted_at: None,
        };
        let envelope = event_envelope(&event);
        assert_eq!(envelope["type"], "event");
        assert_eq!(envelope["data"]["event_id"], 12);
        assert_eq!(envelope["data"]["risk_score"], 75);
        assert_eq!(envelope["data"]["risk_level"], "high");
    }
}
