//! Pipeline assembly
//!
//! One [`Pipeline`] value wires the whole core together: stores, the
//! inference semaphore, the GPU monitor (with its semaphore throttle
//! callback), aggregator, analyzer, detector client, and the background
//! workers. Handles are process-wide but passed explicitly; tests build
//! fresh instances instead of resetting globals.

use crate::aggregator::BatchAggregator;
use crate::analyzer::NemotronAnalyzer;
use crate::config::Settings;
use crate::detector::DetectorClient;
use crate::enrichment::EnrichmentPipeline;
use crate::gpu::{GpuMonitor, MemoryPressureLevel};
use crate::providers::{CompletionProvider, DetectionProvider};
use crate::semaphore::InferenceSemaphore;
use crate::storage::{KeyValueStore, RelationalStore};
use crate::workers::{AnalysisQueueWorker, BatchTimeoutWorker, QueueMetricsWorker};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Wire the GPU pressure signal to semaphore throttling
///
/// WARNING and CRITICAL reduce permits; the return to NORMAL restores the
/// original count.
pub fn register_semaphore_throttle(monitor: &GpuMonitor, semaphore: Arc<InferenceSemaphore>) {
    monitor.register_memory_pressure_callback(Box::new(move |new_level, _old_level| {
        match new_level {
            MemoryPressureLevel::Normal => semaphore.restore_permits_after_pressure(),
            level => semaphore.reduce_permits_for_memory_pressure(level),
        }
    }));
}

/// The assembled pipeline core
pub struct Pipeline {
    pub settings: Settings,
    pub semaphore: Arc<InferenceSemaphore>,
    pub gpu_monitor: Arc<GpuMonitor>,
    pub aggregator: Arc<BatchAggregator>,
    pub analyzer: Arc<NemotronAnalyzer>,
    pub detector: Arc<DetectorClient>,
    pub timeout_worker: Arc<BatchTimeoutWorker>,
    pub analysis_worker: Arc<AnalysisQueueWorker>,
    pub metrics_worker: Arc<QueueMetricsWorker>,
}

impl Pipeline {
    /// Assemble the pipeline against the given stores and providers
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn RelationalStore>,
        llm: Arc<dyn CompletionProvider>,
        detection_provider: Arc<dyn DetectionProvider>,
        enrichment_pipeline: Option<Arc<dyn EnrichmentPipeline>>,
        settings: Settings,
    ) -> Self {
        let semaphore = Arc::new(InferenceSemaphore::new(settings.ai_max_concurrent_inferences));
        let gpu_monitor = Arc::new(GpuMonitor::new(&settings, None));
        register_semaphore_throttle(&gpu_monitor, Arc::clone(&semaphore));

        let mut analyzer = NemotronAnalyzer::new(
            Arc::clone(&kv),
            Arc::clone(&store),
            llm,
            Arc::clone(&semaphore),
            &settings,
        );
        if let Some(pipeline) = enrichment_pipeline {
            analyzer = analyzer.with_enrichment_pipeline(pipeline);
        }
        let analyzer = Arc::new(analyzer);

        let aggregator = Arc::new(
            BatchAggregator::new(Arc::clone(&kv), &settings)
                .with_analyzer(Arc::clone(&analyzer))
                .with_gpu_monitor(Arc::clone(&gpu_monitor)),
        );

        let detector = Arc::new(
            DetectorClient::new(
                detection_provider,
                Arc::clone(&store),
                Arc::clone(&semaphore),
                &settings,
            )
            .with_aggregator(Arc::clone(&aggregator)),
        );

        let timeout_worker = Arc::new(BatchTimeoutWorker::new(Arc::clone(&aggregator)));
        let analysis_worker = Arc::new(AnalysisQueueWorker::new(
            Arc::clone(&kv),
            Arc::clone(&analyzer),
            &settings,
        ));
        let metrics_worker = Arc::new(QueueMetricsWorker::new(Arc::clone(&kv)));

        Self {
            settings,
            semaphore,
            gpu_monitor,
            aggregator,
            analyzer,
            detector,
            timeout_worker,
            analysis_worker,
            metrics_worker,
        }
    }

    /// Start the GPU monitor and all background workers
    pub fn start(&self) {
        let _monitor = self.gpu_monitor.start();
        self.timeout_worker.start();
        self.analysis_worker.start();
        self.metrics_worker.start();
        info!("pipeline started");
    }

    /// Stop everything, draining workers up to `deadline` each
    pub async fn shutdown(&self, deadline: Duration) {
        self.timeout_worker.stop(deadline).await;
        self.analysis_worker.stop(deadline).await;
        self.metrics_worker.stop(deadline).await;
        self.gpu_monitor.stop();
        info!("pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pressure_transitions_throttle_and_restore_permits() {
        let settings = Settings::default();
        let semaphore = Arc::new(InferenceSemaphore::new(4));
        let monitor = GpuMonitor::new(&settings, None);
        register_semaphore_throttle(&monitor, Arc::clone(&semaphore));

        monitor.transition_to(MemoryPressureLevel::Warning);
        assert_eq!(semaphore.available_permits(), 3);

        monitor.transition_to(MemoryPressureLevel::Critical);
        assert_eq!(semaphore.available_permits(), 2);

        monitor.transition_to(MemoryPressureLevel::Normal);
        assert_eq!(semaphore.available_permits(), 4);
    }

    #[tokio::test]
    async fn repeated_levels_do_not_stack_reductions() {
        let settings = Settings::default();
        let semaphore = Arc::new(InferenceSemaphore::new(4));
        let monitor = GpuMonitor::new(&settings, None);
        register_semaphore_throttle(&monitor, Arc::clone(&semaphore));

        monitor.transition_to(MemoryPressureLevel::Critical);
        monitor.transition_to(MemoryPressureLevel::Critical);
        assert_eq!(semaphore.available_permits(), 2);
        assert_eq!(semaphore.reduced_permits(), 2);
    }
}
