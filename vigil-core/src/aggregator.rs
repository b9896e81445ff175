//! Batch aggregation
//!
//! Groups per-camera detections into time-bounded batches in the shared
//! key-value store, promotes qualifying detections onto the fast path, and
//! hands closed batches to the analysis queue.
//!
//! Key lifecycle per batch:
//! `batch:{camera_id}:current` points at the active batch id;
//! `batch:{bid}:camera_id|started_at|last_activity|detections` hold its
//! state until close removes all five keys.

use crate::analyzer::NemotronAnalyzer;
use crate::config::Settings;
use crate::gpu::{GpuMonitor, MemoryPressureLevel};
use crate::models::fast_path_batch_id;
use crate::queue::{AnalysisQueueItem, OverflowPolicy};
use crate::storage::keys;
use crate::storage::KeyValueStore;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Summary returned by [`BatchAggregator::close_batch`]
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub camera_id: String,
    pub detection_count: usize,
    pub detections: Vec<i64>,
    pub started_at: f64,
    pub closed_at: f64,
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Aggregates detections into time-based batches for analysis
pub struct BatchAggregator {
    kv: Arc<dyn KeyValueStore>,
    analyzer: Option<Arc<NemotronAnalyzer>>,
    gpu_monitor: Option<Arc<GpuMonitor>>,
    batch_window: f64,
    idle_timeout: f64,
    fast_path_threshold: f64,
    fast_path_types: Vec<String>,
}

impl BatchAggregator {
    pub fn new(kv: Arc<dyn KeyValueStore>, settings: &Settings) -> Self {
        Self {
            kv,
            analyzer: None,
            gpu_monitor: None,
            batch_window: settings.batch_window_seconds,
            idle_timeout: settings.batch_idle_timeout_seconds,
            fast_path_threshold: settings.fast_path_confidence_threshold,
            fast_path_types: settings
                .fast_path_object_types
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// Attach the analyzer used for fast-path promotion
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<NemotronAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Attach the GPU monitor driving the backpressure signal
    #[must_use]
    pub fn with_gpu_monitor(mut self, gpu_monitor: Arc<GpuMonitor>) -> Self {
        self.gpu_monitor = Some(gpu_monitor);
        self
    }

    /// Add a detection to its camera's batch
    ///
    /// Qualifying detections (confidence at or above the fast-path
    /// threshold AND an object type in the fast-path set) skip batching
    /// entirely: the analyzer is triggered asynchronously and the synthetic
    /// `fast_path_<detection_id>` id is returned.
    pub async fn add_detection(
        &self,
        camera_id: &str,
        detection_id: i64,
        confidence: Option<f64>,
        object_type: Option<&str>,
    ) -> Result<String> {
        if self.should_use_fast_path(confidence, object_type) {
            info!(
                camera_id,
                detection_id,
                confidence = confidence.unwrap_or_default(),
                object_type = object_type.unwrap_or("unknown"),
                "fast path triggered"
            );
            self.spawn_fast_path(camera_id, detection_id);
            return Ok(fast_path_batch_id(detection_id));
        }

        let now = now_epoch();
        let current_key = keys::batch_current_key(camera_id);

        let batch_id = match self.kv.get(&current_key).await? {
            Some(existing) => existing,
            None => self.create_batch(camera_id, &current_key, now).await?,
        };

        // Atomic append, never read-modify-write
        let count = self
            .kv
            .list_append(&keys::batch_detections_key(&batch_id), &detection_id.to_string())
            .await?;
        self.kv
            .set(&keys::batch_activity_key(&batch_id), &now.to_string())
            .await?;

        debug!(
            camera_id,
            detection_id, batch_id, total_detections = count, "added detection to batch"
        );
        Ok(batch_id)
    }

    /// Create batch metadata, resolving the first-detection race with
    /// set-if-absent on the current-batch pointer
    async fn create_batch(&self, camera_id: &str, current_key: &str, now: f64) -> Result<String> {
        let candidate = uuid::Uuid::new_v4().simple().to_string();
        if self.kv.set_if_absent(current_key, &candidate).await? {
            info!(camera_id, batch_id = %candidate, "creating new batch");
            // Metadata writes become observable together
            self.kv
                .set_many(&[
                    (keys::batch_camera_key(&candidate), camera_id.to_string()),
                    (keys::batch_started_key(&candidate), now.to_string()),
                    (keys::batch_activity_key(&candidate), now.to_string()),
                ])
                .await?;
            Ok(candidate)
        } else {
            // Lost the race; use the winner's batch
            self.kv.get(current_key).await?.ok_or_else(|| {
                Error::KeyValue(format!("current batch for {camera_id} vanished during create"))
            })
        }
    }

    fn should_use_fast_path(&self, confidence: Option<f64>, object_type: Option<&str>) -> bool {
        let (Some(confidence), Some(object_type)) = (confidence, object_type) else {
            return false;
        };
        if confidence < self.fast_path_threshold {
            return false;
        }
        self.fast_path_types
            .iter()
            .any(|t| t == &object_type.to_lowercase())
    }

    fn spawn_fast_path(&self, camera_id: &str, detection_id: i64) {
        let Some(analyzer) = self.analyzer.clone() else {
            warn!(
                camera_id,
                detection_id, "fast path requested but no analyzer attached"
            );
            return;
        };
        let camera_id = camera_id.to_string();
        tokio::spawn(async move {
            match analyzer
                .analyze_detection_fast_path(&camera_id, detection_id)
                .await
            {
                Ok(event) => info!(
                    camera_id,
                    detection_id,
                    event_id = event.id,
                    "fast path analysis completed"
                ),
                Err(e) => error!(camera_id, detection_id, "fast path analysis failed: {e}"),
            }
        });
    }

    /// Sweep all active batches and close the expired ones
    ///
    /// A batch closes when its window has elapsed since `started_at` or
    /// the idle timeout has elapsed since `last_activity`; the window
    /// dominates even with recent activity. Per-batch failures are logged
    /// and do not abort the sweep.
    pub async fn check_batch_timeouts(&self) -> Result<Vec<String>> {
        let now = now_epoch();
        let mut closed = Vec::new();

        let current_keys = self.kv.scan_keys(keys::CURRENT_BATCH_PATTERN).await?;
        if current_keys.is_empty() {
            return Ok(closed);
        }

        // Phase 1: current batch ids for every camera key
        let batch_ids: Vec<String> = self
            .kv
            .get_many(&current_keys)
            .await?
            .into_iter()
            .flatten()
            .collect();
        if batch_ids.is_empty() {
            return Ok(closed);
        }

        // Phase 2: started_at / last_activity for every batch
        let mut timestamp_keys = Vec::with_capacity(batch_ids.len() * 2);
        for batch_id in &batch_ids {
            timestamp_keys.push(keys::batch_started_key(batch_id));
            timestamp_keys.push(keys::batch_activity_key(batch_id));
        }
        let timestamps = self.kv.get_many(&timestamp_keys).await?;

        for (i, batch_id) in batch_ids.iter().enumerate() {
            let started_at = timestamps
                .get(i * 2)
                .and_then(|v| v.as_deref())
                .and_then(|s| s.parse::<f64>().ok());
            let Some(started_at) = started_at else {
                warn!(batch_id, "batch missing started_at timestamp, skipping");
                continue;
            };
            let last_activity = timestamps
                .get(i * 2 + 1)
                .and_then(|v| v.as_deref())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(started_at);

            let window_elapsed = now - started_at;
            let idle = now - last_activity;

            let close_reason = if window_elapsed >= self.batch_window {
                Some(format!(
                    "batch window exceeded ({window_elapsed:.1}s >= {}s)",
                    self.batch_window
                ))
            } else if idle >= self.idle_timeout {
                Some(format!(
                    "idle timeout exceeded ({idle:.1}s >= {}s)",
                    self.idle_timeout
                ))
            } else {
                None
            };

            if let Some(reason) = close_reason {
                info!(batch_id, "closing batch: {reason}");
                match self.close_batch(batch_id).await {
                    Ok(_) => closed.push(batch_id.clone()),
                    Err(e) => error!(batch_id, "error closing timed-out batch: {e}"),
                }
            }
        }

        if !closed.is_empty() {
            info!(count = closed.len(), "closed timed-out batches");
        }
        Ok(closed)
    }

    /// Close a batch: enqueue its work item, then remove all batch keys
    ///
    /// Empty batches are never enqueued. A rejected enqueue leaves the
    /// batch state untouched; DLQ movement or a warning is logged but
    /// still succeeds.
    pub async fn close_batch(&self, batch_id: &str) -> Result<BatchSummary> {
        let camera_id = self
            .kv
            .get(&keys::batch_camera_key(batch_id))
            .await?
            .ok_or_else(|| Error::BatchNotFound(batch_id.to_string()))?;

        let detections: Vec<i64> = self
            .kv
            .list_range(&keys::batch_detections_key(batch_id))
            .await?
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();

        let started_at = self
            .kv
            .get(&keys::batch_started_key(batch_id))
            .await?
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or_else(now_epoch);

        let closed_at = now_epoch();

        if detections.is_empty() {
            debug!(batch_id, "batch has no detections, skipping analysis queue");
        } else {
            let item = AnalysisQueueItem {
                batch_id: batch_id.to_string(),
                camera_id: camera_id.clone(),
                detection_ids: detections.clone(),
                timestamp: closed_at,
                attempt: 0,
            };
            let payload = serde_json::to_string(&item)?;
            let push = self
                .kv
                .push_queue(keys::ANALYSIS_QUEUE, &payload, OverflowPolicy::Dlq)
                .await?;
            if !push.success {
                return Err(Error::Queue(format!(
                    "analysis queue rejected batch {batch_id}: {}",
                    push.error.unwrap_or_else(|| "unknown".to_string())
                )));
            }
            if let Some(warning) = push.warning {
                warn!(batch_id, "analysis queue warning: {warning}");
            }
            if push.moved_to_dlq_count > 0 {
                warn!(
                    batch_id,
                    moved = push.moved_to_dlq_count,
                    "analysis queue overflow moved oldest items to DLQ"
                );
            }
            info!(
                batch_id,
                camera_id,
                detections = detections.len(),
                "pushed batch to analysis queue"
            );
        }

        self.kv
            .delete(&[
                keys::batch_current_key(&camera_id),
                keys::batch_camera_key(batch_id),
                keys::batch_started_key(batch_id),
                keys::batch_activity_key(batch_id),
                keys::batch_detections_key(batch_id),
            ])
            .await?;
        debug!(batch_id, "cleaned up batch keys");

        Ok(BatchSummary {
            batch_id: batch_id.to_string(),
            camera_id,
            detection_count: detections.len(),
            detections,
            started_at,
            closed_at,
        })
    }

    /// True when GPU memory pressure is CRITICAL
    ///
    /// Ingress paths may delay, skip, or log; they must not crash.
    pub fn should_apply_backpressure(&self) -> bool {
        self.gpu_monitor
            .as_ref()
            .is_some_and(|m| m.current_pressure_level() == MemoryPressureLevel::Critical)
    }
}
