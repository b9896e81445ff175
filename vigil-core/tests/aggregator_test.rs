//! Batch aggregator behavior against the in-memory key-value store

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use test_utils::{
    create_test_camera, create_test_detection, llm_completion, MemoryKv, MemoryStore,
    MockCompletionProvider,
};
use vigil_core::aggregator::BatchAggregator;
use vigil_core::analyzer::NemotronAnalyzer;
use vigil_core::queue::AnalysisQueueItem;
use vigil_core::semaphore::InferenceSemaphore;
use vigil_core::storage::keys;
use vigil_core::storage::KeyValueStore;
use vigil_core::{Error, Settings};

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

fn aggregator(kv: &Arc<MemoryKv>) -> BatchAggregator {
    BatchAggregator::new(kv.clone() as Arc<dyn KeyValueStore>, &Settings::default())
}

/// Seed batch state directly, with controllable timestamps
async fn seed_batch(
    kv: &MemoryKv,
    camera_id: &str,
    batch_id: &str,
    started_at: f64,
    last_activity: f64,
    detection_ids: &[i64],
) {
    kv.set(&keys::batch_current_key(camera_id), batch_id)
        .await
        .unwrap();
    kv.set(&keys::batch_camera_key(batch_id), camera_id)
        .await
        .unwrap();
    kv.set(&keys::batch_started_key(batch_id), &started_at.to_string())
        .await
        .unwrap();
    kv.set(
        &keys::batch_activity_key(batch_id),
        &last_activity.to_string(),
    )
    .await
    .unwrap();
    for id in detection_ids {
        kv.list_append(&keys::batch_detections_key(batch_id), &id.to_string())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn first_detection_creates_a_batch() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    let batch_id = aggregator
        .add_detection("front_door", 1, Some(0.85), Some("car"))
        .await
        .unwrap();

    let current = kv
        .get(&keys::batch_current_key("front_door"))
        .await
        .unwrap();
    assert_eq!(current.as_deref(), Some(batch_id.as_str()));
    assert_eq!(
        kv.get(&keys::batch_camera_key(&batch_id)).await.unwrap(),
        Some("front_door".to_string())
    );
    assert!(kv
        .get(&keys::batch_started_key(&batch_id))
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        kv.list_range(&keys::batch_detections_key(&batch_id))
            .await
            .unwrap(),
        vec!["1"]
    );
}

#[tokio::test]
async fn subsequent_detections_join_the_open_batch() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    let first = aggregator
        .add_detection("front_door", 1, Some(0.6), Some("car"))
        .await
        .unwrap();
    let second = aggregator
        .add_detection("front_door", 2, Some(0.7), Some("person"))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        kv.list_range(&keys::batch_detections_key(&first))
            .await
            .unwrap(),
        vec!["1", "2"]
    );
}

#[tokio::test]
async fn cameras_get_independent_batches() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    let front = aggregator
        .add_detection("front_door", 1, None, None)
        .await
        .unwrap();
    let back = aggregator
        .add_detection("backyard", 2, None, None)
        .await
        .unwrap();
    assert_ne!(front, back);
}

#[tokio::test]
async fn concurrent_first_detections_share_one_batch() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = Arc::new(aggregator(&kv));

    let mut handles = Vec::new();
    for id in 0..10i64 {
        let aggregator = Arc::clone(&aggregator);
        handles.push(tokio::spawn(async move {
            aggregator
                .add_detection("front_door", id, None, None)
                .await
                .unwrap()
        }));
    }
    let mut batch_ids = Vec::new();
    for handle in handles {
        batch_ids.push(handle.await.unwrap());
    }

    batch_ids.sort();
    batch_ids.dedup();
    assert_eq!(batch_ids.len(), 1, "exactly one live batch per camera");
    let detections = kv
        .list_range(&keys::batch_detections_key(&batch_ids[0]))
        .await
        .unwrap();
    assert_eq!(detections.len(), 10);
}

#[tokio::test]
async fn fast_path_skips_batching() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    // Qualifies: confidence at the threshold, type matches case-insensitively
    let batch_id = aggregator
        .add_detection("front_door", 42, Some(0.95), Some("Person"))
        .await
        .unwrap();
    assert_eq!(batch_id, "fast_path_42");
    assert!(kv
        .get(&keys::batch_current_key("front_door"))
        .await
        .unwrap()
        .is_none());
    assert!(!kv.has_batch_keys("fast_path_42"));
}

#[tokio::test]
async fn fast_path_predicate_truth_table() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    // confidence below threshold
    let id = aggregator
        .add_detection("c1", 1, Some(0.85), Some("person"))
        .await
        .unwrap();
    assert!(!id.starts_with("fast_path_"));

    // type not in the fast-path set
    let id = aggregator
        .add_detection("c2", 2, Some(0.95), Some("car"))
        .await
        .unwrap();
    assert!(!id.starts_with("fast_path_"));

    // null confidence
    let id = aggregator
        .add_detection("c3", 3, None, Some("person"))
        .await
        .unwrap();
    assert!(!id.starts_with("fast_path_"));

    // null type
    let id = aggregator
        .add_detection("c4", 4, Some(0.99), None)
        .await
        .unwrap();
    assert!(!id.starts_with("fast_path_"));

    // boundary: exactly at the threshold qualifies
    let id = aggregator
        .add_detection("c5", 5, Some(0.90), Some("PERSON"))
        .await
        .unwrap();
    assert_eq!(id, "fast_path_5");
}

#[tokio::test]
async fn fast_path_triggers_the_analyzer() {
    let kv = Arc::new(MemoryKv::default());
    let store = Arc::new(MemoryStore::new());
    store.add_camera(create_test_camera("front_door"));
    store.add_detection(create_test_detection(42, "front_door"));

    let llm = Arc::new(MockCompletionProvider::with_content(&llm_completion(
        90, "critical", "Person at door",
    )));
    let semaphore = Arc::new(InferenceSemaphore::new(4));
    let analyzer = Arc::new(NemotronAnalyzer::new(
        kv.clone(),
        store.clone(),
        llm,
        semaphore,
        &Settings::default(),
    ));
    let aggregator = BatchAggregator::new(kv.clone(), &Settings::default())
        .with_analyzer(Arc::clone(&analyzer));

    let batch_id = aggregator
        .add_detection("front_door", 42, Some(0.95), Some("person"))
        .await
        .unwrap();
    assert_eq!(batch_id, "fast_path_42");

    // The analysis runs in a spawned task
    let mut events = store.events();
    for _ in 0..50 {
        if !events.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        events = store.events();
    }
    assert_eq!(events.len(), 1);
    assert!(events[0].is_fast_path);
    assert_eq!(events[0].batch_id, "fast_path_42");
    assert_eq!(events[0].detection_ids, vec![42]);
}

#[tokio::test]
async fn window_timeout_dominates_recent_activity() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);
    let now = now_epoch();

    // 91s since start, only 6s idle: the window wins
    seed_batch(&kv, "front_door", "b1", now - 91.0, now - 6.0, &[1, 2]).await;

    let closed = aggregator.check_batch_timeouts().await.unwrap();
    assert_eq!(closed, vec!["b1".to_string()]);
    assert_eq!(kv.queue_contents("analysis_queue").len(), 1);
}

#[tokio::test]
async fn window_boundary_is_inclusive() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);
    let now = now_epoch();

    // Exactly at the window: closes on this sweep
    seed_batch(&kv, "front_door", "b1", now - 90.0, now, &[1]).await;

    let closed = aggregator.check_batch_timeouts().await.unwrap();
    assert_eq!(closed, vec!["b1".to_string()]);
}

#[tokio::test]
async fn idle_timeout_closes_a_quiet_batch() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);
    let now = now_epoch();

    seed_batch(&kv, "front_door", "b1", now - 40.0, now - 31.0, &[1]).await;

    let closed = aggregator.check_batch_timeouts().await.unwrap();
    assert_eq!(closed, vec!["b1".to_string()]);
}

#[tokio::test]
async fn active_batch_within_window_stays_open() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);
    let now = now_epoch();

    seed_batch(&kv, "front_door", "b1", now - 40.0, now - 5.0, &[1]).await;

    let closed = aggregator.check_batch_timeouts().await.unwrap();
    assert!(closed.is_empty());
    assert!(kv.has_batch_keys("b1"));
}

#[tokio::test]
async fn batch_missing_started_at_is_skipped() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    kv.set(&keys::batch_current_key("front_door"), "b1")
        .await
        .unwrap();
    kv.set(&keys::batch_camera_key("b1"), "front_door")
        .await
        .unwrap();

    let closed = aggregator.check_batch_timeouts().await.unwrap();
    assert!(closed.is_empty());
}

#[tokio::test]
async fn sweep_survives_a_broken_batch() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);
    let now = now_epoch();

    // b1 is expired but missing its camera_id key, so close fails
    kv.set(&keys::batch_current_key("cam_a"), "b1").await.unwrap();
    kv.set(&keys::batch_started_key("b1"), &(now - 120.0).to_string())
        .await
        .unwrap();
    // b2 is healthy and expired
    seed_batch(&kv, "cam_b", "b2", now - 120.0, now - 120.0, &[7]).await;

    let closed = aggregator.check_batch_timeouts().await.unwrap();
    assert_eq!(closed, vec!["b2".to_string()]);
}

#[tokio::test]
async fn close_batch_enqueues_and_removes_all_keys() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);
    let now = now_epoch();

    seed_batch(&kv, "front_door", "b1", now - 10.0, now, &[1, 2, 3]).await;

    let summary = aggregator.close_batch("b1").await.unwrap();
    assert_eq!(summary.batch_id, "b1");
    assert_eq!(summary.camera_id, "front_door");
    assert_eq!(summary.detection_count, 3);
    assert_eq!(summary.detections, vec![1, 2, 3]);

    let queued = kv.queue_contents("analysis_queue");
    assert_eq!(queued.len(), 1);
    let item: AnalysisQueueItem = serde_json::from_str(&queued[0]).unwrap();
    assert_eq!(item.batch_id, "b1");
    assert_eq!(item.camera_id, "front_door");
    assert_eq!(item.detection_ids, vec![1, 2, 3]);

    assert!(!kv.has_batch_keys("b1"));
    assert!(kv
        .get(&keys::batch_current_key("front_door"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn empty_batch_closes_without_enqueue() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);
    let now = now_epoch();

    seed_batch(&kv, "front_door", "b1", now - 10.0, now, &[]).await;

    let summary = aggregator.close_batch("b1").await.unwrap();
    assert_eq!(summary.detection_count, 0);
    assert!(kv.queue_contents("analysis_queue").is_empty());
    assert!(!kv.has_batch_keys("b1"));
}

#[tokio::test]
async fn closing_unknown_batch_fails() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    let err = aggregator.close_batch("missing").await.unwrap_err();
    assert!(matches!(err, Error::BatchNotFound(_)));
}

#[tokio::test]
async fn full_queue_moves_oldest_to_dlq_but_close_succeeds() {
    let kv = Arc::new(MemoryKv::new(1));
    let aggregator =
        BatchAggregator::new(kv.clone() as Arc<dyn KeyValueStore>, &Settings::default());
    let now = now_epoch();

    seed_batch(&kv, "cam_a", "b1", now - 10.0, now, &[1]).await;
    seed_batch(&kv, "cam_b", "b2", now - 10.0, now, &[2]).await;

    aggregator.close_batch("b1").await.unwrap();
    aggregator.close_batch("b2").await.unwrap();

    assert_eq!(kv.queue_contents("analysis_queue").len(), 1);
    assert_eq!(kv.queue_contents("dlq:analysis_queue").len(), 1);
    assert!(!kv.has_batch_keys("b2"));
}

#[tokio::test]
async fn ordering_is_preserved_in_the_detection_list() {
    let kv = Arc::new(MemoryKv::default());
    let aggregator = aggregator(&kv);

    let batch_id = aggregator
        .add_detection("front_door", 5, None, None)
        .await
        .unwrap();
    aggregator
        .add_detection("front_door", 3, None, None)
        .await
        .unwrap();
    aggregator
        .add_detection("front_door", 9, None, None)
        .await
        .unwrap();

    assert_eq!(
        kv.list_range(&keys::batch_detections_key(&batch_id))
            .await
            .unwrap(),
        vec!["5", "3", "9"]
    );
}
