//! Queue depth metrics
//!
//! Samples the analysis queue and its dead-letter sibling on an interval
//! and emits gauge-style log events for the observability stack.

use super::{Lifecycle, WorkerState};
use crate::storage::keys;
use crate::storage::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic queue depth sampler
pub struct QueueMetricsWorker {
    kv: Arc<dyn KeyValueStore>,
    queues: Vec<String>,
    interval: Duration,
    lifecycle: Lifecycle,
}

impl QueueMetricsWorker {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_interval(kv, DEFAULT_SAMPLE_INTERVAL)
    }

    pub fn with_interval(kv: Arc<dyn KeyValueStore>, interval: Duration) -> Self {
        Self {
            kv,
            queues: vec![
                keys::ANALYSIS_QUEUE.to_string(),
                keys::dlq_name(keys::ANALYSIS_QUEUE),
            ],
            interval,
            lifecycle: Lifecycle::new("queue-metrics"),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// Start the sampling loop; idempotent
    pub fn start(self: &Arc<Self>) {
        if !self.lifecycle.begin_start() {
            return;
        }
        let worker = Arc::clone(self);
        let mut shutdown = self.lifecycle.shutdown_receiver();
        let handle = tokio::spawn(async move {
            worker.lifecycle.set_state(WorkerState::Running);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(worker.interval) => {
                        worker.sample_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        self.lifecycle.store_handle(handle);
    }

    async fn sample_once(&self) {
        for queue in &self.queues {
            match self.kv.queue_len(queue).await {
                Ok(depth) => info!(queue = %queue, depth, "queue depth"),
                Err(e) => warn!(queue = %queue, "queue depth sample failed: {e}"),
            }
        }
    }

    /// Stop the sampling loop
    pub async fn stop(&self, deadline: Duration) {
        self.lifecycle.stop(deadline).await;
    }
}
