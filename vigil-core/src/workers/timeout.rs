//! Batch timeout sweeper
//!
//! Periodically sweeps the key-value store for expired batches and closes
//! them. Under CRITICAL GPU memory pressure the sweep still runs (closing
//! batches relieves pressure downstream), but the backpressure signal is
//! logged so ingress paths can react.

use super::{Lifecycle, WorkerState};
use crate::aggregator::BatchAggregator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default sweep interval
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic batch-timeout sweeper
pub struct BatchTimeoutWorker {
    aggregator: Arc<BatchAggregator>,
    interval: Duration,
    lifecycle: Lifecycle,
}

impl BatchTimeoutWorker {
    pub fn new(aggregator: Arc<BatchAggregator>) -> Self {
        Self::with_interval(aggregator, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_interval(aggregator: Arc<BatchAggregator>, interval: Duration) -> Self {
        Self {
            aggregator,
            interval,
            lifecycle: Lifecycle::new("batch-timeout"),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// Start the sweep loop; idempotent
    pub fn start(self: &Arc<Self>) {
        if !self.lifecycle.begin_start() {
            return;
        }
        let worker = Arc::clone(self);
        let mut shutdown = self.lifecycle.shutdown_receiver();
        let handle = tokio::spawn(async move {
            worker.lifecycle.set_state(WorkerState::Running);
            info!(interval_s = worker.interval.as_secs_f64(), "batch timeout worker started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(worker.interval) => {
                        worker.sweep_once().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("batch timeout worker stopped");
        });
        self.lifecycle.store_handle(handle);
    }

    async fn sweep_once(&self) {
        if self.aggregator.should_apply_backpressure() {
            warn!("GPU memory pressure critical, ingress should apply backpressure");
        }
        match self.aggregator.check_batch_timeouts().await {
            Ok(closed) if closed.is_empty() => debug!("no batches due"),
            Ok(closed) => debug!(closed = closed.len(), "sweep closed batches"),
            Err(e) => error!("batch timeout sweep failed: {e}"),
        }
    }

    /// Stop and drain, up to `deadline`
    pub async fn stop(&self, deadline: Duration) {
        self.lifecycle.stop(deadline).await;
    }
}
