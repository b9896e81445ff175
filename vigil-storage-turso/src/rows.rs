//! Row conversion
//!
//! Timestamps are INTEGER milliseconds since epoch in every table.

use chrono::{DateTime, Utc};
use vigil_core::context::Zone;
use vigil_core::enrichment::EnrichmentData;
use vigil_core::models::{BoundingBox, Camera, Detection, Event, MediaType, RiskLevel};
use vigil_core::{Error, Result};

/// Column list shared by every camera SELECT
pub(crate) const CAMERA_COLUMNS: &str = "id, name, folder_path, status, created_at, deleted_at";

/// Column list shared by every detection SELECT
pub(crate) const DETECTION_COLUMNS: &str = "id, camera_id, file_path, file_type, detected_at, \
     object_type, confidence, bbox_x, bbox_y, bbox_width, bbox_height, thumbnail_path, \
     media_type, duration, video_codec, video_width, video_height, track_id, \
     track_confidence, enrichment_data, deleted_at";

/// Column list shared by every event SELECT
pub(crate) const EVENT_COLUMNS: &str = "id, batch_id, camera_id, started_at, ended_at, \
     risk_score, risk_level, summary, reasoning, reviewed, is_fast_path, llm_prompt, \
     detection_ids, deleted_at";

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::Storage(format!("timestamp out of range: {ms}")))
}

fn storage_err(e: libsql::Error) -> Error {
    Error::Storage(e.to_string())
}

pub(crate) fn row_to_camera(row: &libsql::Row) -> Result<Camera> {
    let id: String = row.get(0).map_err(storage_err)?;
    let name: String = row.get(1).map_err(storage_err)?;
    let folder_path: String = row.get(2).map_err(storage_err)?;
    let status: String = row.get(3).map_err(storage_err)?;
    let created_at: i64 = row.get(4).map_err(storage_err)?;
    let deleted_at: Option<i64> = row.get(5).map_err(storage_err)?;

    Ok(Camera {
        id,
        name,
        folder_path,
        status,
        created_at: from_millis(created_at)?,
        deleted_at: deleted_at.map(from_millis).transpose()?,
    })
}

pub(crate) fn row_to_detection(row: &libsql::Row) -> Result<Detection> {
    let id: i64 = row.get(0).map_err(storage_err)?;
    let camera_id: String = row.get(1).map_err(storage_err)?;
    let file_path: String = row.get(2).map_err(storage_err)?;
    let file_type: Option<String> = row.get(3).map_err(storage_err)?;
    let detected_at: i64 = row.get(4).map_err(storage_err)?;
    let object_type: Option<String> = row.get(5).map_err(storage_err)?;
    let confidence: Option<f64> = row.get(6).map_err(storage_err)?;
    let bbox_x: Option<f64> = row.get(7).map_err(storage_err)?;
    let bbox_y: Option<f64> = row.get(8).map_err(storage_err)?;
    let bbox_width: Option<f64> = row.get(9).map_err(storage_err)?;
    let bbox_height: Option<f64> = row.get(10).map_err(storage_err)?;
    let thumbnail_path: Option<String> = row.get(11).map_err(storage_err)?;
    let media_type: Option<String> = row.get(12).map_err(storage_err)?;
    let duration: Option<f64> = row.get(13).map_err(storage_err)?;
    let video_codec: Option<String> = row.get(14).map_err(storage_err)?;
    let video_width: Option<i64> = row.get(15).map_err(storage_err)?;
    let video_height: Option<i64> = row.get(16).map_err(storage_err)?;
    let track_id: Option<i64> = row.get(17).map_err(storage_err)?;
    let track_confidence: Option<f64> = row.get(18).map_err(storage_err)?;
    let enrichment_json: Option<String> = row.get(19).map_err(storage_err)?;
    let deleted_at: Option<i64> = row.get(20).map_err(storage_err)?;

    let bbox = match (bbox_x, bbox_y, bbox_width, bbox_height) {
        (Some(x), Some(y), Some(width), Some(height)) => Some(BoundingBox {
            x,
            y,
            width,
            height,
        }),
        _ => None,
    };

    let enrichment_data = enrichment_json
        .as_deref()
        .map(|raw| {
            let value: serde_json::Value = serde_json::from_str(raw)
                .map_err(|e| Error::Storage(format!("failed to parse enrichment_data: {e}")))?;
            EnrichmentData::from_value(&value)
        })
        .transpose()?;

    Ok(Detection {
        id,
        camera_id,
        file_path,
        file_type,
        detected_at: from_millis(detected_at)?,
        object_type,
        confidence,
        bbox,
        thumbnail_path,
        media_type: media_type.as_deref().and_then(MediaType::parse),
        duration,
        video_codec,
        video_width,
        video_height,
        track_id,
        track_confidence,
        enrichment_data,
        deleted_at: deleted_at.map(from_millis).transpose()?,
    })
}

pub(crate) fn row_to_event(row: &libsql::Row) -> Result<Event> {
    let id: i64 = row.get(0).map_err(storage_err)?;
    let batch_id: String = row.get(1).map_err(storage_err)?;
    let camera_id: String = row.get(2).map_err(storage_err)?;
    let started_at: i64 = row.get(3).map_err(storage_err)?;
    let ended_at: i64 = row.get(4).map_err(storage_err)?;
    let risk_score: i64 = row.get(5).map_err(storage_err)?;
    let risk_level: String = row.get(6).map_err(storage_err)?;
    let summary: String = row.get(7).map_err(storage_err)?;
    let reasoning: String = row.get(8).map_err(storage_err)?;
    let reviewed: i64 = row.get(9).map_err(storage_err)?;
    let is_fast_path: i64 = row.get(10).map_err(storage_err)?;
    let llm_prompt: Option<String> = row.get(11).map_err(storage_err)?;
    let detection_ids_json: String = row.get(12).map_err(storage_err)?;
    let deleted_at: Option<i64> = row.get(13).map_err(storage_err)?;

    let detection_ids: Vec<i64> = serde_json::from_str(&detection_ids_json)
        .map_err(|e| Error::Storage(format!("failed to parse detection_ids: {e}")))?;

    Ok(Event {
        id,
        batch_id,
        camera_id,
        started_at: from_millis(started_at)?,
        ended_at: from_millis(ended_at)?,
        risk_score: risk_score.clamp(0, 100) as u8,
        risk_level: RiskLevel::parse(&risk_level).unwrap_or(RiskLevel::Medium),
        summary,
        reasoning,
        reviewed: reviewed != 0,
        is_fast_path: is_fast_path != 0,
        llm_prompt,
        detection_ids,
        deleted_at: deleted_at.map(from_millis).transpose()?,
    })
}

pub(crate) fn row_to_zone(row: &libsql::Row) -> Result<Zone> {
    let id: String = row.get(0).map_err(storage_err)?;
    let camera_id: String = row.get(1).map_err(storage_err)?;
    let name: String = row.get(2).map_err(storage_err)?;
    let zone_type: String = row.get(3).map_err(storage_err)?;
    Ok(Zone {
        id,
        camera_id,
        name,
        zone_type,
    })
}
