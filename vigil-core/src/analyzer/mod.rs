//! Nemotron risk analysis
//!
//! Turns a closed batch (or a single fast-path detection) into a persisted
//! [`Event`] with a validated risk assessment, then broadcasts it. The LLM
//! is fallible by design: connect/timeout/server errors and unparsable
//! completions all degrade to fallback risk data so every closed batch
//! still yields exactly one event.

pub mod parse;
pub mod prompts;
pub mod sanitize;
pub mod streaming;
pub mod validate;

use crate::broadcast::event_envelope;
use crate::config::Settings;
use crate::context::{ContextEnricher, EnrichedContext};
use crate::enrichment::{EnrichmentPipeline, EnrichmentResult};
use crate::models::{fast_path_batch_id, Detection, Event, NewEvent, SeverityThresholds};
use crate::providers::{CompletionProvider, CompletionRequest};
use crate::semaphore::InferenceSemaphore;
use crate::storage::keys;
use crate::storage::{BatchFetchOptions, KeyValueStore, RelationalStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use parse::extract_risk_object;
pub use prompts::{build_prompt, select_template, PromptInputs, PromptTemplate};
pub use validate::{validate_risk_data, RiskAssessment};

/// Analyzes detection batches with the Nemotron LLM
pub struct NemotronAnalyzer {
    kv: Arc<dyn KeyValueStore>,
    store: Arc<dyn RelationalStore>,
    llm: Arc<dyn CompletionProvider>,
    semaphore: Arc<InferenceSemaphore>,
    enricher: Option<ContextEnricher>,
    pipeline: Option<Arc<dyn EnrichmentPipeline>>,
    thresholds: SeverityThresholds,
    context_window: usize,
    max_output_tokens: usize,
}

/// Everything resolved about a batch before the LLM call
pub(crate) struct BatchContext {
    pub camera_id: String,
    pub camera_name: String,
    pub detections: Vec<Detection>,
    pub detection_ids: Vec<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl NemotronAnalyzer {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn RelationalStore>,
        llm: Arc<dyn CompletionProvider>,
        semaphore: Arc<InferenceSemaphore>,
        settings: &Settings,
    ) -> Self {
        Self {
            kv,
            enricher: Some(ContextEnricher::new(Arc::clone(&store))),
            store,
            llm,
            semaphore,
            pipeline: None,
            thresholds: SeverityThresholds::from_settings(settings),
            context_window: settings.nemotron_context_window,
            max_output_tokens: settings.nemotron_max_output_tokens,
        }
    }

    /// Disable context enrichment (basic prompts only)
    #[must_use]
    pub fn without_context_enrichment(mut self) -> Self {
        self.enricher = None;
        self
    }

    /// Attach an enrichment pipeline
    #[must_use]
    pub fn with_enrichment_pipeline(mut self, pipeline: Arc<dyn EnrichmentPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Analyze a closed batch and persist its event
    ///
    /// `camera_id` and `detection_ids` come from the queue item; when
    /// absent (legacy path) they are read back from the batch keys in the
    /// key-value store.
    pub async fn analyze_batch(
        &self,
        batch_id: &str,
        camera_id: Option<&str>,
        detection_ids: Option<Vec<i64>>,
    ) -> Result<Event> {
        if let Some(existing) = self.check_idempotency(batch_id).await? {
            info!(
                batch_id,
                event_id = existing.id,
                "event already exists for batch, skipping analysis"
            );
            return Ok(existing);
        }

        let (camera_id, detection_ids) =
            self.resolve_batch(batch_id, camera_id, detection_ids).await?;

        info!(
            batch_id,
            camera_id,
            detection_count = detection_ids.len(),
            "analyzing batch"
        );

        let context = self.load_batch_context(batch_id, &camera_id, &detection_ids).await?;
        let (enriched_context, enrichment_result) = self.gather_enrichment(batch_id, &context).await;

        let (assessment, prompt) = self
            .run_llm(&context, enriched_context.as_ref(), enrichment_result.as_ref())
            .await;

        let event = NewEvent {
            batch_id: batch_id.to_string(),
            camera_id: context.camera_id.clone(),
            started_at: context.started_at,
            ended_at: context.ended_at,
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level,
            summary: assessment.summary,
            reasoning: assessment.reasoning,
            is_fast_path: false,
            llm_prompt: prompt,
            detection_ids: context.detection_ids.clone(),
        };
        self.persist_and_broadcast(event, enrichment_result.as_ref()).await
    }

    /// Analyze a single high-priority detection, bypassing batching
    pub async fn analyze_detection_fast_path(
        &self,
        camera_id: &str,
        detection_id: i64,
    ) -> Result<Event> {
        let batch_id = fast_path_batch_id(detection_id);
        if let Some(existing) = self.check_idempotency(&batch_id).await? {
            info!(
                batch_id,
                event_id = existing.id,
                "fast path event already exists, skipping analysis"
            );
            return Ok(existing);
        }

        info!(camera_id, detection_id, "fast path analysis");

        let context = self
            .load_batch_context(&batch_id, camera_id, &[detection_id])
            .await?;
        let (enriched_context, enrichment_result) =
            self.gather_enrichment(&batch_id, &context).await;

        let (assessment, prompt) = self
            .run_llm(&context, enriched_context.as_ref(), enrichment_result.as_ref())
            .await;

        // The single detection's time bounds the window on both ends
        let event = NewEvent {
            batch_id,
            camera_id: context.camera_id.clone(),
            started_at: context.started_at,
            ended_at: context.started_at,
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level,
            summary: assessment.summary,
            reasoning: assessment.reasoning,
            is_fast_path: true,
            llm_prompt: prompt,
            detection_ids: vec![detection_id],
        };
        self.persist_and_broadcast(event, enrichment_result.as_ref()).await
    }

    /// True iff the LLM health endpoint answers 200
    pub async fn health_check(&self) -> bool {
        self.llm.health_check().await
    }

    /// Resolve camera id and detection ids, reading the batch keys when the
    /// caller did not supply them
    pub(crate) async fn resolve_batch(
        &self,
        batch_id: &str,
        camera_id: Option<&str>,
        detection_ids: Option<Vec<i64>>,
    ) -> Result<(String, Vec<i64>)> {
        let camera_id = match camera_id {
            Some(id) => id.to_string(),
            None => self
                .kv
                .get(&keys::batch_camera_key(batch_id))
                .await?
                .ok_or_else(|| Error::BatchNotFound(batch_id.to_string()))?,
        };

        let detection_ids = match detection_ids {
            Some(ids) => ids,
            None => {
                let raw = self
                    .kv
                    .list_range(&keys::batch_detections_key(batch_id))
                    .await?;
                let mut ids = Vec::with_capacity(raw.len());
                for value in raw {
                    let id = value.trim().parse::<i64>().map_err(|_| {
                        Error::InvalidInput(format!("invalid detection id: {value}"))
                    })?;
                    ids.push(id);
                }
                ids
            }
        };

        if detection_ids.is_empty() {
            return Err(Error::NoDetections(batch_id.to_string()));
        }
        Ok((camera_id, detection_ids))
    }

    /// Load camera and detection rows and derive the time window
    pub(crate) async fn load_batch_context(
        &self,
        batch_id: &str,
        camera_id: &str,
        detection_ids: &[i64],
    ) -> Result<BatchContext> {
        let camera_name = match self.store.get_camera(camera_id).await? {
            Some(camera) => camera.name,
            None => {
                warn!(camera_id, "camera not found, using id as name");
                camera_id.to_string()
            }
        };

        let detections = self
            .store
            .fetch_detections(detection_ids, BatchFetchOptions::default())
            .await?;
        if detections.is_empty() {
            return Err(Error::NoDetections(batch_id.to_string()));
        }

        let started_at = detections
            .iter()
            .map(|d| d.detected_at)
            .min()
            .unwrap_or_else(Utc::now);
        let ended_at = detections
            .iter()
            .map(|d| d.detected_at)
            .max()
            .unwrap_or(started_at);

        Ok(BatchContext {
            camera_id: camera_id.to_string(),
            camera_name,
            detections,
            detection_ids: detection_ids.to_vec(),
            started_at,
            ended_at,
        })
    }

    /// Gather enriched context and pipeline output; failures degrade to
    /// the basic prompt rather than failing the analysis
    pub(crate) async fn gather_enrichment(
        &self,
        batch_id: &str,
        context: &BatchContext,
    ) -> (Option<EnrichedContext>, Option<EnrichmentResult>) {
        let enriched = match &self.enricher {
            Some(enricher) => {
                match enricher
                    .enrich(
                        &context.camera_id,
                        &context.camera_name,
                        &context.detections,
                        context.started_at,
                    )
                    .await
                {
                    Ok(enriched) => Some(enriched),
                    Err(e) => {
                        warn!(batch_id, "context enrichment failed, using basic prompt: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        let enrichment = match &self.pipeline {
            Some(pipeline) => {
                match pipeline.enrich(&context.camera_id, &context.detections).await {
                    Ok(result) if result.has_data() => Some(result),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(batch_id, "enrichment pipeline failed: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        (enriched, enrichment)
    }

    /// Render the detection list for the prompt
    pub(crate) fn format_detections(detections: &[Detection]) -> String {
        detections
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let time = d.detected_at.format("%H:%M:%S");
                let object_type = d.object_type.as_deref().unwrap_or("unknown");
                let confidence = d
                    .confidence
                    .map(|c| format!("{c:.2}"))
                    .unwrap_or_else(|| "N/A".to_string());
                format!(
                    "  {}. {} - {} (confidence: {})",
                    i + 1,
                    time,
                    object_type,
                    confidence
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Build the prompt for a batch
    pub(crate) fn build_batch_prompt(
        &self,
        context: &BatchContext,
        enriched: Option<&EnrichedContext>,
        enrichment: Option<&EnrichmentResult>,
    ) -> (String, PromptTemplate) {
        let camera_name = sanitize::sanitize_camera_name(&context.camera_name);
        let detections_list =
            sanitize::sanitize_detection_description(&Self::format_detections(&context.detections));
        let start_time = context.started_at.to_rfc3339();
        let end_time = context.ended_at.to_rfc3339();

        let (prompt, template) = build_prompt(PromptInputs {
            camera_name: &camera_name,
            start_time: &start_time,
            end_time: &end_time,
            detections_list: &detections_list,
            enriched_context: enriched,
            enrichment_result: enrichment,
        });
        let prompt =
            prompts::validate_and_truncate(prompt, self.context_window, self.max_output_tokens);
        (prompt, template)
    }

    /// Call the LLM and validate its output
    ///
    /// Returns the fallback assessment on any LLM or parse failure; the
    /// returned prompt is recorded on the event either way.
    async fn run_llm(
        &self,
        context: &BatchContext,
        enriched: Option<&EnrichedContext>,
        enrichment: Option<&EnrichmentResult>,
    ) -> (RiskAssessment, Option<String>) {
        let (prompt, template) = self.build_batch_prompt(context, enriched, enrichment);
        debug!(template = template.as_str(), "prompt template selected");

        let request = CompletionRequest::risk_analysis(prompt.clone(), self.max_output_tokens);

        let completion = {
            let _permit = self.semaphore.acquire().await;
            self.llm.complete(&request).await
        };

        let assessment = match completion {
            Ok(content) => match extract_risk_object(&content) {
                Ok(raw) => validate_risk_data(&raw, &self.thresholds),
                Err(e) => {
                    error!("failed to parse LLM completion: {e}");
                    RiskAssessment::llm_failure_fallback()
                }
            },
            Err(e) => {
                error!(
                    "LLM analysis failed: {}",
                    sanitize::sanitize_log_value(&e.to_string())
                );
                RiskAssessment::llm_failure_fallback()
            }
        };
        (assessment, Some(prompt))
    }

    /// Persist the event (with junction rows and enrichment maps) and
    /// broadcast the envelope
    pub(crate) async fn persist_and_broadcast(
        &self,
        event: NewEvent,
        enrichment: Option<&EnrichmentResult>,
    ) -> Result<Event> {
        let batch_id = event.batch_id.clone();
        let enrichment_maps: HashMap<i64, crate::enrichment::EnrichmentData> = enrichment
            .map(|r| r.per_detection.clone())
            .unwrap_or_default();

        let stored = self.store.persist_event(event, &enrichment_maps).await?;
        self.record_idempotency(&batch_id, stored.id).await;

        info!(
            event_id = stored.id,
            batch_id,
            risk_score = stored.risk_score,
            risk_level = %stored.risk_level,
            "created event"
        );

        if let Err(e) = self.broadcast_event(&stored).await {
            warn!(event_id = stored.id, "failed to broadcast event: {e}");
        }
        Ok(stored)
    }

    /// Return the already-created event for a batch id, if any
    pub(crate) async fn check_idempotency(&self, batch_id: &str) -> Result<Option<Event>> {
        if let Some(marker) = self.kv.get(&keys::idempotency_key(batch_id)).await? {
            if let Ok(event_id) = marker.parse::<i64>() {
                if let Some(event) = self.store.get_event(event_id).await? {
                    return Ok(Some(event));
                }
            }
        }
        // Marker may be lost (restart, eviction); the unique live event per
        // batch id in the database is authoritative
        self.store.find_event_by_batch_id(batch_id).await
    }

    async fn record_idempotency(&self, batch_id: &str, event_id: i64) {
        if let Err(e) = self
            .kv
            .set(&keys::idempotency_key(batch_id), &event_id.to_string())
            .await
        {
            warn!(batch_id, event_id, "failed to record idempotency marker: {e}");
        }
    }

    /// Publish the event envelope on the broadcast channel
    pub(crate) async fn broadcast_event(&self, event: &Event) -> Result<()> {
        if event.is_deleted() {
            debug!(event_id = event.id, "skipping broadcast for soft-deleted event");
            return Ok(());
        }
        let message = serde_json::to_string(&event_envelope(event))?;
        self.kv.publish(keys::EVENTS_CHANNEL, &message).await?;
        debug!(event_id = event.id, "broadcasted event");
        Ok(())
    }

    pub(crate) fn thresholds(&self) -> &SeverityThresholds {
        &self.thresholds
    }
}
