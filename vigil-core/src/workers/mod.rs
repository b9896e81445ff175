//! Background workers
//!
//! Each worker owns one periodic or queue-driven loop with an explicit
//! lifecycle (Created → Starting → Running → Stopping → Stopped),
//! idempotent start/stop, and a bounded drain on shutdown.

pub mod analysis;
pub mod metrics;
pub mod timeout;

pub use analysis::{AnalysisQueueWorker, WorkerMetrics};
pub use metrics::QueueMetricsWorker;
pub use timeout::BatchTimeoutWorker;

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Created => "created",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Shared start/stop machinery for workers
pub(crate) struct Lifecycle {
    state: watch::Sender<WorkerState>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    name: &'static str,
}

impl Lifecycle {
    pub(crate) fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);
        let (shutdown, _) = watch::channel(false);
        Self {
            state,
            shutdown,
            handle: Mutex::new(None),
            name,
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        let _ = self.state.send(state);
    }

    pub(crate) fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Transition into Starting; false when already started
    pub(crate) fn begin_start(&self) -> bool {
        let current = self.state();
        if matches!(current, WorkerState::Starting | WorkerState::Running) {
            warn!(worker = self.name, state = %current, "start ignored");
            return false;
        }
        // Reset the shutdown flag from a previous run
        let _ = self.shutdown.send(false);
        self.set_state(WorkerState::Starting);
        true
    }

    pub(crate) fn store_handle(&self, handle: JoinHandle<()>) {
        *self.handle.lock() = Some(handle);
    }

    /// Signal shutdown and wait for the loop to drain, up to `deadline`
    pub(crate) async fn stop(&self, deadline: Duration) {
        if matches!(self.state(), WorkerState::Created | WorkerState::Stopped) {
            return;
        }
        self.set_state(WorkerState::Stopping);
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(deadline, handle).await.is_err() {
                warn!(worker = self.name, "did not drain within deadline");
            }
        }
        self.set_state(WorkerState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_start_is_idempotent() {
        let lifecycle = Lifecycle::new("test");
        assert!(lifecycle.begin_start());
        lifecycle.set_state(WorkerState::Running);
        assert!(!lifecycle.begin_start());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.stop(Duration::from_millis(10)).await;
        assert_eq!(lifecycle.state(), WorkerState::Created);
    }

    #[tokio::test]
    async fn stop_waits_for_the_loop() {
        let lifecycle = Lifecycle::new("test");
        assert!(lifecycle.begin_start());
        lifecycle.set_state(WorkerState::Running);
        let mut shutdown = lifecycle.shutdown_receiver();
        lifecycle.store_handle(tokio::spawn(async move {
            let _ = shutdown.changed().await;
        }));
        lifecycle.stop(Duration::from_secs(1)).await;
        assert_eq!(lifecycle.state(), WorkerState::Stopped);
    }
}
