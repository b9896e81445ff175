//! Analysis queue worker: consumption, error routing, shutdown

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    create_test_camera, create_test_detection, llm_completion, MemoryKv, MemoryStore,
    MockCompletionProvider,
};
use vigil_core::analyzer::NemotronAnalyzer;
use vigil_core::queue::{AnalysisQueueItem, OverflowPolicy};
use vigil_core::semaphore::InferenceSemaphore;
use vigil_core::storage::keys;
use vigil_core::storage::KeyValueStore;
use vigil_core::workers::{AnalysisQueueWorker, BatchTimeoutWorker, WorkerState};
use vigil_core::{BatchAggregator, Settings};

struct Fixture {
    kv: Arc<MemoryKv>,
    store: Arc<MemoryStore>,
    worker: Arc<AnalysisQueueWorker>,
}

fn fixture() -> Fixture {
    let kv = Arc::new(MemoryKv::default());
    let store = Arc::new(MemoryStore::new());
    store.add_camera(create_test_camera("front_door"));
    store.add_detection(create_test_detection(1, "front_door"));
    let analyzer = Arc::new(NemotronAnalyzer::new(
        kv.clone(),
        store.clone(),
        Arc::new(MockCompletionProvider::with_content(&llm_completion(
            75, "high", "s",
        ))),
        Arc::new(InferenceSemaphore::new(4)),
        &Settings::default(),
    ));
    let worker = Arc::new(
        AnalysisQueueWorker::new(kv.clone(), analyzer, &Settings::default())
            .with_infrastructure_pause(Duration::from_millis(50)),
    );
    Fixture { kv, store, worker }
}

async fn enqueue(kv: &MemoryKv, batch_id: &str, detection_ids: Vec<i64>) {
    let item = AnalysisQueueItem {
        batch_id: batch_id.to_string(),
        camera_id: "front_door".to_string(),
        detection_ids,
        timestamp: 0.0,
        attempt: 0,
    };
    kv.push_queue(
        keys::ANALYSIS_QUEUE,
        &serde_json::to_string(&item).unwrap(),
        OverflowPolicy::Dlq,
    )
    .await
    .unwrap();
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn worker_processes_queue_items_into_events() {
    let fixture = fixture();
    enqueue(&fixture.kv, "b1", vec![1]).await;

    fixture.worker.start();
    let store = Arc::clone(&fixture.store);
    wait_until(move || !store.events().is_empty()).await;
    fixture.worker.stop(Duration::from_secs(2)).await;

    let events = fixture.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].batch_id, "b1");
    assert_eq!(fixture.worker.metrics().processed.load(Ordering::Relaxed), 1);
    assert_eq!(fixture.worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn malformed_items_are_dropped() {
    let fixture = fixture();
    fixture
        .kv
        .push_queue(keys::ANALYSIS_QUEUE, "{not json", OverflowPolicy::Dlq)
        .await
        .unwrap();
    enqueue(&fixture.kv, "b1", vec![1]).await;

    fixture.worker.start();
    let store = Arc::clone(&fixture.store);
    wait_until(move || !store.events().is_empty()).await;
    fixture.worker.stop(Duration::from_secs(2)).await;

    assert_eq!(fixture.worker.metrics().dropped.load(Ordering::Relaxed), 1);
    assert_eq!(fixture.worker.metrics().processed.load(Ordering::Relaxed), 1);
    // The malformed item does not reach the DLQ, it is gone
    assert!(fixture.kv.queue_contents("dlq:analysis_queue").is_empty());
}

#[tokio::test]
async fn items_without_detections_are_dropped_not_retried() {
    let fixture = fixture();
    enqueue(&fixture.kv, "empty_batch", vec![]).await;

    fixture.worker.start();
    let worker = Arc::clone(&fixture.worker);
    wait_until(move || worker.metrics().dropped.load(Ordering::Relaxed) == 1).await;
    fixture.worker.stop(Duration::from_secs(2)).await;

    assert!(fixture.store.events().is_empty());
    assert!(fixture.kv.queue_contents(keys::ANALYSIS_QUEUE).is_empty());
    assert!(fixture.kv.queue_contents("dlq:analysis_queue").is_empty());
}

#[tokio::test]
async fn infrastructure_outage_requeues_and_recovers() {
    let fixture = fixture();
    enqueue(&fixture.kv, "b1", vec![1]).await;

    // The relational store is down when the worker first picks the item up
    fixture.store.set_failing(true);
    fixture.worker.start();

    let worker = Arc::clone(&fixture.worker);
    wait_until(move || worker.metrics().errors.load(Ordering::Relaxed) >= 1).await;
    fixture.store.set_failing(false);

    let store = Arc::clone(&fixture.store);
    wait_until(move || !store.events().is_empty()).await;
    fixture.worker.stop(Duration::from_secs(2)).await;

    assert_eq!(fixture.store.events().len(), 1);
}

#[tokio::test]
async fn start_is_idempotent() {
    let fixture = fixture();
    fixture.worker.start();
    fixture.worker.start();
    fixture.worker.stop(Duration::from_secs(2)).await;
    assert_eq!(fixture.worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn timeout_worker_closes_expired_batches() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = Arc::new(BatchAggregator::new(
        kv.clone() as Arc<dyn KeyValueStore>,
        &Settings {
            batch_idle_timeout_seconds: 0.05,
            ..Default::default()
        },
    ));
    aggregator
        .add_detection("front_door", 1, None, None)
        .await
        .unwrap();

    let worker = Arc::new(BatchTimeoutWorker::with_interval(
        Arc::clone(&aggregator),
        Duration::from_millis(50),
    ));
    worker.start();

    let kv_clone = Arc::clone(&kv);
    wait_until(move || kv_clone.queue_contents(keys::ANALYSIS_QUEUE).len() == 1).await;
    worker.stop(Duration::from_secs(2)).await;

    assert_eq!(worker.state(), WorkerState::Stopped);
}
