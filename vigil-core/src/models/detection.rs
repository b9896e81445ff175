//! Object detection record

use crate::enrichment::EnrichmentData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Build from the detector's corner form `[x1, y1, x2, y2]`
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
        }
    }
}

/// Media kind of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

/// A single persisted object detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: i64,
    pub camera_id: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub object_type: Option<String>,
    /// Detector confidence, clamped to [0, 1] on validation
    pub confidence: Option<f64>,
    pub bbox: Option<BoundingBox>,
    pub thumbnail_path: Option<String>,
    pub media_type: Option<MediaType>,
    /// Video duration in seconds, when `media_type` is video
    pub duration: Option<f64>,
    pub video_codec: Option<String>,
    pub video_width: Option<i64>,
    pub video_height: Option<i64>,
    pub track_id: Option<i64>,
    /// Tracker confidence, clamped to [0, 1] on validation
    pub track_confidence: Option<f64>,
    /// Deferred enrichment map, written when the analyzer persists an event
    pub enrichment_data: Option<EnrichmentData>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Detection {
    /// Whether this detection carries a soft-delete tombstone
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Insertable detection, before an id is assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDetection {
    pub camera_id: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub object_type: Option<String>,
    pub confidence: Option<f64>,
    pub bbox: Option<BoundingBox>,
    pub media_type: Option<MediaType>,
}

impl NewDetection {
    /// Clamp confidence fields into their valid range
    pub fn normalized(mut self) -> Self {
        if let Some(c) = self.confidence {
            self.confidence = Some(c.clamp(0.0, 1.0));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_from_corners_converts_to_extent() {
        let b = BoundingBox::from_corners(100.0, 150.0, 300.0, 450.0);
        assert_eq!(b.x, 100.0);
        assert_eq!(b.y, 150.0);
        assert_eq!(b.width, 200.0);
        assert_eq!(b.height, 300.0);
    }

    #[test]
    fn bbox_from_inverted_corners_clamps_extent() {
        let b = BoundingBox::from_corners(300.0, 450.0, 100.0, 150.0);
        assert_eq!(b.width, 0.0);
        assert_eq!(b.height, 0.0);
    }

    #[test]
    fn normalized_clamps_confidence() {
        let d = NewDetection {
            camera_id: "front_door".into(),
            file_path: "/data/img.jpg".into(),
            file_type: None,
            detected_at: Utc::now(),
            object_type: Some("person".into()),
            confidence: Some(1.7),
            bbox: None,
            media_type: Some(MediaType::Image),
        }
        .normalized();
        assert_eq!(d.confidence, Some(1.0));
    }
}
