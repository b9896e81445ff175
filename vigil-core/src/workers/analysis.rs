//! Analysis queue consumer
//!
//! Dequeues work items, hands them to the analyzer, and routes failures:
//! recoverable errors requeue with backoff up to the retry cap and then
//! dead-letter; permanent client errors are logged and dropped;
//! infrastructure outages requeue the item untouched and pause the worker.

use super::{Lifecycle, WorkerState};
use crate::analyzer::NemotronAnalyzer;
use crate::config::Settings;
use crate::queue::{AnalysisQueueItem, OverflowPolicy};
use crate::storage::keys;
use crate::storage::KeyValueStore;
use crate::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long one dequeue blocks before re-checking shutdown
const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Base delay for per-item retry backoff
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
/// Cap for per-item retry backoff
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default pause after an infrastructure error before touching the queue
const DEFAULT_INFRASTRUCTURE_PAUSE: Duration = Duration::from_secs(5);

/// Counters published by the worker
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub processed: AtomicU64,
    pub retried: AtomicU64,
    pub dropped: AtomicU64,
    pub dead_lettered: AtomicU64,
    pub errors: AtomicU64,
}

/// Consumes the analysis queue
pub struct AnalysisQueueWorker {
    kv: Arc<dyn KeyValueStore>,
    analyzer: Arc<NemotronAnalyzer>,
    max_retries: u32,
    infrastructure_pause: Duration,
    metrics: WorkerMetrics,
    lifecycle: Lifecycle,
}

impl AnalysisQueueWorker {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        analyzer: Arc<NemotronAnalyzer>,
        settings: &Settings,
    ) -> Self {
        Self {
            kv,
            analyzer,
            max_retries: settings.worker_max_retries,
            infrastructure_pause: DEFAULT_INFRASTRUCTURE_PAUSE,
            metrics: WorkerMetrics::default(),
            lifecycle: Lifecycle::new("analysis-queue"),
        }
    }

    /// Override the infrastructure pause (short intervals for tests)
    #[must_use]
    pub fn with_infrastructure_pause(mut self, pause: Duration) -> Self {
        self.infrastructure_pause = pause;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }

    /// Start the consume loop; idempotent
    pub fn start(self: &Arc<Self>) {
        if !self.lifecycle.begin_start() {
            return;
        }
        let worker = Arc::clone(self);
        let mut shutdown = self.lifecycle.shutdown_receiver();
        let handle = tokio::spawn(async move {
            worker.lifecycle.set_state(WorkerState::Running);
            info!("analysis queue worker started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                // The dequeue itself is the shutdown check point: it blocks
                // at most POP_TIMEOUT, and no inference permit is held here
                match worker.kv.pop_queue(keys::ANALYSIS_QUEUE, POP_TIMEOUT).await {
                    Ok(Some(payload)) => worker.process_payload(&payload).await,
                    Ok(None) => {}
                    Err(e) => {
                        error!("analysis queue unavailable: {e}");
                        worker.metrics.errors.fetch_add(1, Ordering::Relaxed);
                        tokio::select! {
                            _ = tokio::time::sleep(worker.infrastructure_pause) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
            }
            info!("analysis queue worker stopped");
        });
        self.lifecycle.store_handle(handle);
    }

    async fn process_payload(&self, payload: &str) {
        let item: AnalysisQueueItem = match serde_json::from_str(payload) {
            Ok(item) => item,
            Err(e) => {
                let preview: String = payload.chars().take(120).collect();
                warn!("dropping malformed queue item ({e}): {preview}");
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let result = self
            .analyzer
            .analyze_batch(
                &item.batch_id,
                Some(&item.camera_id),
                Some(item.detection_ids.clone()),
            )
            .await;

        match result {
            Ok(event) => {
                debug!(
                    batch_id = %item.batch_id,
                    event_id = event.id,
                    "queue item processed"
                );
                self.metrics.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_infrastructure() => {
                // Not the item's fault: requeue untouched, pause, continue
                error!(batch_id = %item.batch_id, "infrastructure error, pausing worker: {e}");
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                self.requeue(&item).await;
                tokio::time::sleep(self.infrastructure_pause).await;
            }
            Err(e) if e.is_recoverable() => self.handle_retryable(item, &e).await,
            Err(e) => {
                warn!(
                    batch_id = %item.batch_id,
                    "dropping queue item after permanent error: {e}"
                );
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn handle_retryable(&self, mut item: AnalysisQueueItem, error: &Error) {
        item.attempt += 1;
        if item.attempt > self.max_retries {
            warn!(
                batch_id = %item.batch_id,
                attempts = item.attempt,
                "retry budget exhausted, routing to DLQ: {error}"
            );
            self.metrics.dead_lettered.fetch_add(1, Ordering::Relaxed);
            self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            self.push(&keys::dlq_name(keys::ANALYSIS_QUEUE), &item, OverflowPolicy::DropOldest)
                .await;
            return;
        }

        let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(item.attempt.saturating_sub(1));
        let delay = delay.min(RETRY_MAX_DELAY);
        warn!(
            batch_id = %item.batch_id,
            attempt = item.attempt,
            delay_ms = delay.as_millis() as u64,
            "requeueing after retryable error: {error}"
        );
        self.metrics.retried.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(delay).await;
        self.push(keys::ANALYSIS_QUEUE, &item, OverflowPolicy::Dlq).await;
    }

    async fn requeue(&self, item: &AnalysisQueueItem) {
        self.push(keys::ANALYSIS_QUEUE, item, OverflowPolicy::Dlq).await;
    }

    async fn push(&self, queue: &str, item: &AnalysisQueueItem, policy: OverflowPolicy) {
        let payload = match serde_json::to_string(item) {
            Ok(payload) => payload,
            Err(e) => {
                error!(batch_id = %item.batch_id, "failed to serialize queue item: {e}");
                return;
            }
        };
        match self.kv.push_queue(queue, &payload, policy).await {
            Ok(result) if !result.success => {
                error!(
                    batch_id = %item.batch_id,
                    queue,
                    "queue rejected requeue: {:?}",
                    result.error
                );
            }
            Ok(_) => {}
            Err(e) => error!(batch_id = %item.batch_id, queue, "requeue failed: {e}"),
        }
    }

    /// Stop and drain the in-flight item, up to `deadline`
    pub async fn stop(&self, deadline: Duration) {
        self.lifecycle.stop(deadline).await;
    }
}
