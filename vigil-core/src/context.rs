//! Context enrichment
//!
//! Builds the zone / baseline / cross-camera context that upgrades the
//! analyzer's prompt beyond the bare detection list. All queries go through
//! the [`RelationalStore`] trait; failures degrade to a basic prompt rather
//! than failing the analysis.

use crate::analyzer::sanitize::{sanitize_camera_name, sanitize_zone_name};
use crate::models::Detection;
use crate::storage::RelationalStore;
use crate::Result;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Correlation window for cross-camera activity (seconds)
pub const CROSS_CAMERA_WINDOW_SECONDS: i64 = 300;

/// How far back recent events are considered (hours)
const RECENT_EVENT_WINDOW_HOURS: i64 = 24;

/// Deviation score at which activity is flagged anomalous
const ANOMALY_THRESHOLD: f64 = 0.5;

/// A camera zone definition stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub camera_id: String,
    pub name: String,
    /// entry_point, driveway, sidewalk, yard, other
    pub zone_type: String,
}

/// Zone information attached to a batch
#[derive(Debug, Clone)]
pub struct ZoneContext {
    pub zone_id: String,
    pub zone_name: String,
    pub zone_type: String,
    /// high / medium / low, derived from the zone type
    pub risk_weight: &'static str,
    pub detection_count: usize,
}

/// Baseline deviation information for the batch window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineContext {
    pub hour_of_day: u32,
    pub day_of_week: String,
    /// Expected count per object class for this camera-hour
    pub expected_detections: HashMap<String, f64>,
    /// Observed count per object class in the current batch
    pub current_detections: HashMap<String, usize>,
    /// 0 = normal, 1 = highly unusual
    pub deviation_score: f64,
    pub is_anomalous: bool,
}

/// Activity seen on another camera inside the correlation window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossCameraActivity {
    pub camera_id: String,
    pub camera_name: String,
    pub detection_count: usize,
    pub object_types: Vec<String>,
    /// Seconds relative to the batch start; negative means before
    pub time_offset_seconds: f64,
}

/// Complete enriched context for a detection batch
#[derive(Debug, Clone, Default)]
pub struct EnrichedContext {
    pub camera_id: String,
    pub camera_name: String,
    pub zones: Vec<ZoneContext>,
    pub baselines: Option<BaselineContext>,
    pub recent_event_summaries: Vec<String>,
    pub cross_camera: Vec<CrossCameraActivity>,
}

fn zone_risk_weight(zone_type: &str) -> &'static str {
    match zone_type {
        "entry_point" => "high",
        "driveway" | "yard" => "medium",
        _ => "low",
    }
}

fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Builds enriched context from relational queries
pub struct ContextEnricher {
    store: Arc<dyn RelationalStore>,
}

impl ContextEnricher {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    /// Assemble the full context for a batch
    pub async fn enrich(
        &self,
        camera_id: &str,
        camera_name: &str,
        detections: &[Detection],
        window_start: DateTime<Utc>,
    ) -> Result<EnrichedContext> {
        let zones = self.zone_context(camera_id, detections).await?;
        let baselines = self
            .baseline_context(camera_id, detections, window_start)
            .await?;
        let recent_event_summaries = self.recent_event_summaries(camera_id).await?;
        let cross_camera = self.cross_camera_activity(camera_id, window_start).await?;

        debug!(
            camera_id,
            zones = zones.len(),
            cross_camera = cross_camera.len(),
            "context enriched"
        );

        Ok(EnrichedContext {
            camera_id: camera_id.to_string(),
            camera_name: camera_name.to_string(),
            zones,
            baselines: Some(baselines),
            recent_event_summaries,
            cross_camera,
        })
    }

    async fn zone_context(
        &self,
        camera_id: &str,
        detections: &[Detection],
    ) -> Result<Vec<ZoneContext>> {
        let zones = self.store.zones_for_camera(camera_id).await?;
        Ok(zones
            .into_iter()
            .map(|zone| ZoneContext {
                risk_weight: zone_risk_weight(&zone.zone_type),
                zone_id: zone.id,
                zone_name: zone.name,
                zone_type: zone.zone_type,
                detection_count: detections.len().max(1),
            })
            .collect())
    }

    async fn baseline_context(
        &self,
        camera_id: &str,
        detections: &[Detection],
        window_start: DateTime<Utc>,
    ) -> Result<BaselineContext> {
        let hour_of_day = window_start.hour();
        let expected = self.store.activity_baseline(camera_id, hour_of_day).await?;

        let mut current: HashMap<String, usize> = HashMap::new();
        for detection in detections {
            let class = detection
                .object_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *current.entry(class).or_insert(0) += 1;
        }

        let deviation_score = deviation(&expected, &current);

        Ok(BaselineContext {
            hour_of_day,
            day_of_week: day_name(window_start.weekday()).to_string(),
            expected_detections: expected,
            current_detections: current,
            is_anomalous: deviation_score >= ANOMALY_THRESHOLD,
            deviation_score,
        })
    }

    async fn recent_event_summaries(&self, camera_id: &str) -> Result<Vec<String>> {
        let since = Utc::now() - Duration::hours(RECENT_EVENT_WINDOW_HOURS);
        let events = self
            .store
            .recent_events_for_camera(camera_id, since, 5)
            .await?;
        Ok(events
            .iter()
            .map(|e| {
                format!(
                    "[{}] {} (score {})",
                    e.risk_level.as_str(),
                    e.summary,
                    e.risk_score
                )
            })
            .collect())
    }

    async fn cross_camera_activity(
        &self,
        camera_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<CrossCameraActivity>> {
        let since = window_start - Duration::seconds(CROSS_CAMERA_WINDOW_SECONDS);
        let detections = self
            .store
            .recent_detections_elsewhere(camera_id, since)
            .await?;

        let mut grouped: HashMap<String, (usize, Vec<String>, f64)> = HashMap::new();
        for detection in detections {
            let offset = (detection.detected_at - window_start).num_seconds() as f64;
            let entry = grouped
                .entry(detection.camera_id.clone())
                .or_insert((0, Vec::new(), offset));
            entry.0 += 1;
            if let Some(object_type) = &detection.object_type {
                if !entry.1.contains(object_type) {
                    entry.1.push(object_type.clone());
                }
            }
        }

        let mut activities = Vec::with_capacity(grouped.len());
        for (other_camera_id, (count, object_types, offset)) in grouped {
            let camera_name = self
                .store
                .get_camera(&other_camera_id)
                .await?
                .map(|c| c.name)
                .unwrap_or_else(|| other_camera_id.clone());
            activities.push(CrossCameraActivity {
                camera_id: other_camera_id,
                camera_name,
                detection_count: count,
                object_types,
                time_offset_seconds: offset,
            });
        }
        activities.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        Ok(activities)
    }
}

/// Deviation of observed class counts against the expected baseline
///
/// 0 when observation matches expectation; approaches 1 as classes appear
/// with no baseline or counts diverge far from the expectation.
fn deviation(expected: &HashMap<String, f64>, current: &HashMap<String, usize>) -> f64 {
    if current.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for (class, &count) in current {
        let expected_count = expected.get(class).copied().unwrap_or(0.0);
        if expected_count <= f64::EPSILON {
            total += 1.0;
        } else {
            let ratio = (count as f64 - expected_count).abs() / expected_count;
            total += ratio.min(1.0);
        }
    }
    (total / current.len() as f64).clamp(0.0, 1.0)
}

/// Format zone context for prompt inclusion
pub fn format_zone_analysis(zones: &[ZoneContext]) -> String {
    if zones.is_empty() {
        return "No zone data available.".to_string();
    }
    zones
        .iter()
        .map(|zone| {
            format!(
                "- {} ({}): {} detection(s), risk weight: {}",
                sanitize_zone_name(&zone.zone_name),
                zone.zone_type,
                zone.detection_count,
                zone.risk_weight
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format baseline comparison for prompt inclusion
pub fn format_baseline_comparison(baseline: Option<&BaselineContext>) -> String {
    let Some(baseline) = baseline else {
        return "No baseline data available.".to_string();
    };

    let mut lines = Vec::new();
    if baseline.expected_detections.is_empty() {
        lines.push("No historical baseline for this time slot.".to_string());
    } else {
        lines.push("Expected activity:".to_string());
        let mut expected: Vec<_> = baseline.expected_detections.iter().collect();
        expected.sort_by(|a, b| a.0.cmp(b.0));
        for (class, count) in expected {
            lines.push(format!("  - {class}: ~{count:.1} per hour"));
        }
    }
    if !baseline.current_detections.is_empty() {
        lines.push("Current activity:".to_string());
        let mut current: Vec<_> = baseline.current_detections.iter().collect();
        current.sort_by(|a, b| a.0.cmp(b.0));
        for (class, count) in current {
            lines.push(format!("  - {class}: {count}"));
        }
    }
    if baseline.is_anomalous {
        lines.push(format!(
            "NOTICE: Activity is unusual for this time (deviation: {:.2})",
            baseline.deviation_score
        ));
    }
    lines.join("\n")
}

/// Format cross-camera activity for prompt inclusion
pub fn format_cross_camera_summary(cross_camera: &[CrossCameraActivity]) -> String {
    if cross_camera.is_empty() {
        return "No activity detected on other cameras.".to_string();
    }
    cross_camera
        .iter()
        .map(|activity| {
            let offset_desc = if activity.time_offset_seconds.abs() > 60.0 {
                let minutes = activity.time_offset_seconds.abs() / 60.0;
                let direction = if activity.time_offset_seconds < 0.0 {
                    "before"
                } else {
                    "after"
                };
                format!(" ({minutes:.0} min {direction})")
            } else {
                String::new()
            };
            let types = if activity.object_types.is_empty() {
                "unknown".to_string()
            } else {
                activity.object_types.join(", ")
            };
            format!(
                "- {}: {} detection(s) [{}]{}",
                sanitize_camera_name(&activity.camera_name),
                activity.detection_count,
                types,
                offset_desc
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_types_map_to_risk_weights() {
        assert_eq!(zone_risk_weight("entry_point"), "high");
        assert_eq!(zone_risk_weight("driveway"), "medium");
        assert_eq!(zone_risk_weight("yard"), "medium");
        assert_eq!(zone_risk_weight("sidewalk"), "low");
        assert_eq!(zone_risk_weight("other"), "low");
    }

    #[test]
    fn deviation_is_zero_with_no_activity() {
        assert_eq!(deviation(&HashMap::new(), &HashMap::new()), 0.0);
    }

    #[test]
    fn unexpected_class_raises_deviation() {
        let expected = HashMap::new();
        let current = HashMap::from([("person".to_string(), 3usize)]);
        assert_eq!(deviation(&expected, &current), 1.0);
    }

    #[test]
    fn matching_counts_keep_deviation_low() {
        let expected = HashMap::from([("person".to_string(), 3.0f64)]);
        let current = HashMap::from([("person".to_string(), 3usize)]);
        assert!(deviation(&expected, &current) < 0.01);
    }

    #[test]
    fn formatters_handle_empty_inputs() {
        assert_eq!(format_zone_analysis(&[]), "No zone data available.");
        assert_eq!(
            format_baseline_comparison(None),
            "No baseline data available."
        );
        assert_eq!(
            format_cross_camera_summary(&[]),
            "No activity detected on other cameras."
        );
    }

    #[test]
    fn cross_camera_formatter_includes_offsets_over_a_minute() {
        let activity = CrossCameraActivity {
            camera_id: "backyard".into(),
            camera_name: "Backyard".into(),
            detection_count: 2,
            object_types: vec!["person".into()],
            time_offset_seconds: -120.0,
        };
        let text = format_cross_camera_summary(&[activity]);
        assert!(text.contains("2 min before"));
        assert!(text.contains("[person]"));
    }
}
