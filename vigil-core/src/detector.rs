//! Detector client
//!
//! Converts an image file plus camera id into persisted [`Detection`] rows:
//! validates the file locally, POSTs it to the detector service under one
//! inference permit, filters low-confidence results, persists the
//! survivors, and feeds each into the batch aggregator.

use crate::aggregator::BatchAggregator;
use crate::config::Settings;
use crate::models::{Detection, MediaType, NewDetection};
use crate::providers::{DetectionProvider, RawDetection};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::semaphore::InferenceSemaphore;
use crate::storage::RelationalStore;
use crate::{Error, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File extensions accepted as detector input
const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Client for the object-detector service
pub struct DetectorClient {
    provider: Arc<dyn DetectionProvider>,
    store: Arc<dyn RelationalStore>,
    semaphore: Arc<InferenceSemaphore>,
    aggregator: Option<Arc<BatchAggregator>>,
    confidence_threshold: f64,
    retry: RetryPolicy,
}

impl DetectorClient {
    pub fn new(
        provider: Arc<dyn DetectionProvider>,
        store: Arc<dyn RelationalStore>,
        semaphore: Arc<InferenceSemaphore>,
        settings: &Settings,
    ) -> Self {
        Self {
            provider,
            store,
            semaphore,
            aggregator: None,
            confidence_threshold: settings.detection_confidence_threshold,
            retry: RetryPolicy::new(
                RetryConfig::default().with_max_retries(settings.detector_max_retries),
            ),
        }
    }

    /// Attach the aggregator that receives every persisted detection
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Arc<BatchAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Detect objects in an image and persist the qualifying rows
    ///
    /// Connect/timeout/5xx failures surface as
    /// [`Error::DetectorUnavailable`] after the retry budget, so the queue
    /// worker can retry or route to the DLQ.
    pub async fn detect_objects(&self, image_path: &str, camera_id: &str) -> Result<Vec<Detection>> {
        let image = self.validate_and_read(image_path).await?;
        let file_name = Path::new(image_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_path.to_string());

        let raw = {
            let _permit = self.semaphore.acquire().await;
            self.retry
                .execute(|| {
                    let image = image.clone();
                    let file_name = file_name.clone();
                    async move { self.provider.detect(image, &file_name).await }
                })
                .await?
        };

        debug!(
            camera_id,
            detections = raw.len(),
            "detector returned raw detections"
        );

        let mut persisted = Vec::new();
        for detection in raw {
            if detection.confidence < self.confidence_threshold {
                debug!(
                    camera_id,
                    class = %detection.class,
                    confidence = detection.confidence,
                    "dropping low-confidence detection"
                );
                continue;
            }
            let stored = self.persist_detection(camera_id, image_path, &detection).await?;
            if let Some(aggregator) = &self.aggregator {
                if let Err(e) = aggregator
                    .add_detection(
                        camera_id,
                        stored.id,
                        stored.confidence,
                        stored.object_type.as_deref(),
                    )
                    .await
                {
                    warn!(
                        camera_id,
                        detection_id = stored.id,
                        "failed to add detection to batch: {e}"
                    );
                }
            }
            persisted.push(stored);
        }

        info!(
            camera_id,
            persisted = persisted.len(),
            "detection completed"
        );
        Ok(persisted)
    }

    /// True iff the detector health endpoint answers 200
    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }

    /// Validate the image locally before any network I/O
    async fn validate_and_read(&self, image_path: &str) -> Result<Vec<u8>> {
        let path = Path::new(image_path);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !SUPPORTED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::InvalidInput(format!(
                "unsupported image extension: {extension:?}"
            )));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::InvalidInput(format!("cannot read image file: {e}"))
        })?;
        if bytes.is_empty() {
            return Err(Error::InvalidInput("image file is empty".to_string()));
        }
        Ok(bytes)
    }

    async fn persist_detection(
        &self,
        camera_id: &str,
        image_path: &str,
        raw: &RawDetection,
    ) -> Result<Detection> {
        let new_detection = NewDetection {
            camera_id: camera_id.to_string(),
            file_path: image_path.to_string(),
            file_type: Path::new(image_path)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_lowercase),
            detected_at: Utc::now(),
            object_type: Some(raw.class.clone()),
            confidence: Some(raw.confidence),
            bbox: raw.bbox,
            media_type: Some(MediaType::Image),
        }
        .normalized();
        self.store.insert_detection(new_detection).await
    }
}
