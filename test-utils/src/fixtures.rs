//! Test fixtures

use chrono::{DateTime, Duration, Utc};
use vigil_core::models::{Camera, Detection, Event, MediaType, RiskLevel};

/// A live camera with sensible defaults
pub fn create_test_camera(id: &str) -> Camera {
    Camera {
        id: id.to_string(),
        name: id.replace('_', " "),
        folder_path: format!("/data/cameras/{id}"),
        status: "active".to_string(),
        created_at: Utc::now(),
        deleted_at: None,
    }
}

/// A live detection with the given id on a camera
pub fn create_test_detection(id: i64, camera_id: &str) -> Detection {
    create_test_detection_at(id, camera_id, Utc::now())
}

/// A live detection at a specific time
pub fn create_test_detection_at(id: i64, camera_id: &str, detected_at: DateTime<Utc>) -> Detection {
    Detection {
        id,
        camera_id: camera_id.to_string(),
        file_path: format!("/data/cameras/{camera_id}/img_{id}.jpg"),
        file_type: Some("jpg".to_string()),
        detected_at,
        object_type: Some("person".to_string()),
        confidence: Some(0.85),
        bbox: None,
        thumbnail_path: None,
        media_type: Some(MediaType::Image),
        duration: None,
        video_codec: None,
        video_width: None,
        video_height: None,
        track_id: None,
        track_confidence: None,
        enrichment_data: None,
        deleted_at: None,
    }
}

/// A sequence of detections spaced one second apart
pub fn create_detection_series(camera_id: &str, first_id: i64, count: usize) -> Vec<Detection> {
    let start = Utc::now();
    (0..count)
        .map(|i| {
            create_test_detection_at(
                first_id + i as i64,
                camera_id,
                start + Duration::seconds(i as i64),
            )
        })
        .collect()
}

/// A live event for a batch
pub fn create_test_event(id: i64, batch_id: &str, camera_id: &str) -> Event {
    let now = Utc::now();
    Event {
        id,
        batch_id: batch_id.to_string(),
        camera_id: camera_id.to_string(),
        started_at: now,
        ended_at: now,
        risk_score: 40,
        risk_level: RiskLevel::Medium,
        summary: "Activity detected".to_string(),
        reasoning: "Test fixture".to_string(),
        reviewed: false,
        is_fast_path: false,
        llm_prompt: None,
        detection_ids: Vec::new(),
        deleted_at: None,
    }
}

/// A well-formed LLM completion carrying the given score and level
pub fn llm_completion(risk_score: u8, risk_level: &str, summary: &str) -> String {
    format!(
        r#"{{"risk_score": {risk_score}, "risk_level": "{risk_level}", "summary": "{summary}", "reasoning": "test reasoning"}}"#
    )
}
