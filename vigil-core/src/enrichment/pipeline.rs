//! Enrichment pipeline integration contract
//!
//! The pipeline itself (license plate OCR, face detection, pose, threat,
//! re-id, action models) is an external collaborator. The analyzer consumes
//! its output opaquely: per-detection enrichment maps plus batch-level
//! signals that drive prompt template selection.

use crate::enrichment::EnrichmentData;
use crate::models::Detection;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scene-level context extracted by the vision models
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentContext {
    /// Coarse time of day ("day", "night", "dawn", "dusk")
    pub time_of_day: String,
}

/// Output of the vision extraction stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionExtraction {
    pub environment_context: Option<EnvironmentContext>,
    /// Free-text scene analysis, already formatted for prompt use
    pub scene_analysis: Option<String>,
}

/// A re-identification match against a previously seen entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReidMatch {
    pub entity_id: String,
    pub similarity: f64,
    pub last_seen_camera_id: String,
}

/// Model-zoo signals beyond the base vision extraction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelZooSignals {
    pub pose_summaries: Vec<String>,
    pub threat_summaries: Vec<String>,
    pub demographics_summaries: Vec<String>,
    pub action_summaries: Vec<String>,
}

impl ModelZooSignals {
    pub fn is_empty(&self) -> bool {
        self.pose_summaries.is_empty()
            && self.threat_summaries.is_empty()
            && self.demographics_summaries.is_empty()
            && self.action_summaries.is_empty()
    }
}

/// Aggregate result of running the enrichment pipeline over a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Per-detection enrichment maps, keyed by detection id
    pub per_detection: HashMap<i64, EnrichmentData>,
    pub vision_extraction: Option<VisionExtraction>,
    pub model_zoo: ModelZooSignals,
    pub person_reid_matches: Vec<ReidMatch>,
    pub vehicle_reid_matches: Vec<ReidMatch>,
}

impl EnrichmentResult {
    /// Whether the vision extraction stage produced output
    pub fn has_vision_extraction(&self) -> bool {
        self.vision_extraction.is_some()
    }

    /// Whether any model-zoo signal beyond vision extraction is present
    pub fn has_model_zoo(&self) -> bool {
        !self.model_zoo.is_empty()
            || !self.person_reid_matches.is_empty()
            || !self.vehicle_reid_matches.is_empty()
    }

    /// Whether the result carries anything at all
    pub fn has_data(&self) -> bool {
        !self.per_detection.is_empty() || self.has_vision_extraction() || self.has_model_zoo()
    }

    /// Render the signals as prompt context lines
    pub fn to_context_string(&self) -> String {
        let mut lines = Vec::new();
        for (detection_id, data) in &self.per_detection {
            if let Some(plates) = &data.license_plates {
                for plate in plates {
                    if let Some(text) = &plate.text {
                        lines.push(format!("  Detection {detection_id}: license plate {text}"));
                    }
                }
            }
            if let Some(violence) = &data.violence {
                if violence.is_violent {
                    lines.push(format!(
                        "  Detection {detection_id}: violence indicator ({})",
                        violence.predicted_class.as_deref().unwrap_or("unknown")
                    ));
                }
            }
        }
        for summary in self
            .model_zoo
            .pose_summaries
            .iter()
            .chain(&self.model_zoo.threat_summaries)
            .chain(&self.model_zoo.demographics_summaries)
            .chain(&self.model_zoo.action_summaries)
        {
            lines.push(format!("  {summary}"));
        }
        if lines.is_empty() {
            "  No enrichment signals available.".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// External enrichment pipeline collaborator
#[async_trait]
pub trait EnrichmentPipeline: Send + Sync {
    /// Run the configured vision models over a batch of detections
    async fn enrich(&self, camera_id: &str, detections: &[Detection]) -> Result<EnrichmentResult>;
}

/// Pipeline stand-in for deployments without the vision models
#[derive(Debug, Default)]
pub struct NoopEnrichmentPipeline;

#[async_trait]
impl EnrichmentPipeline for NoopEnrichmentPipeline {
    async fn enrich(&self, _camera_id: &str, _detections: &[Detection]) -> Result<EnrichmentResult> {
        Ok(EnrichmentResult::default())
    }
}
