//! Integration tests for Turso storage over a local file database

use chrono::{Duration, Utc};
use std::collections::HashMap;
use tempfile::TempDir;
use vigil_core::models::{MediaType, NewDetection, NewEvent, RiskLevel};
use vigil_core::storage::BatchFetchOptions;
use vigil_storage_turso::TursoStorage;

async fn create_test_storage() -> anyhow::Result<(TursoStorage, TempDir)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.db");
    let url = format!("file:{}", db_path.to_str().unwrap());
    let storage = TursoStorage::new(&url, "").await?;
    storage.initialize_schema().await?;
    Ok((storage, dir))
}

fn new_detection(camera_id: &str, offset_secs: i64) -> NewDetection {
    NewDetection {
        camera_id: camera_id.to_string(),
        file_path: format!("/data/{camera_id}/img_{offset_secs}.jpg"),
        file_type: Some("jpg".to_string()),
        detected_at: Utc::now() + Duration::seconds(offset_secs),
        object_type: Some("person".to_string()),
        confidence: Some(0.85),
        bbox: None,
        media_type: Some(MediaType::Image),
    }
}

fn new_event(batch_id: &str, camera_id: &str, detection_ids: Vec<i64>) -> NewEvent {
    let now = Utc::now();
    NewEvent {
        batch_id: batch_id.to_string(),
        camera_id: camera_id.to_string(),
        started_at: now,
        ended_at: now,
        risk_score: 75,
        risk_level: RiskLevel::High,
        summary: "Person near entrance".to_string(),
        reasoning: "Unusual hour".to_string(),
        is_fast_path: false,
        llm_prompt: Some("prompt".to_string()),
        detection_ids,
    }
}

#[tokio::test]
async fn camera_round_trip() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("front_door", "Front Door", "/data/front_door")
        .await
        .unwrap();

    let camera = storage.get_camera("front_door").await.unwrap().unwrap();
    assert_eq!(camera.name, "Front Door");
    assert_eq!(camera.status, "active");
    assert!(!camera.is_deleted());

    assert!(storage.get_camera("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn detection_round_trip_preserves_fields() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("front_door", "Front Door", "/data/front_door")
        .await
        .unwrap();

    let mut spec = new_detection("front_door", 0);
    spec.bbox = Some(vigil_core::models::BoundingBox {
        x: 100.0,
        y: 150.0,
        width: 200.0,
        height: 300.0,
    });
    let stored = storage.insert_detection(spec).await.unwrap();

    let fetched = storage.get_detection(stored.id).await.unwrap().unwrap();
    assert_eq!(fetched.camera_id, "front_door");
    assert_eq!(fetched.object_type.as_deref(), Some("person"));
    assert_eq!(fetched.confidence, Some(0.85));
    assert_eq!(fetched.media_type, Some(MediaType::Image));
    let bbox = fetched.bbox.unwrap();
    assert_eq!(bbox.width, 200.0);
}

#[tokio::test]
async fn out_of_range_confidence_is_clamped_on_insert() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();

    let mut spec = new_detection("cam", 0);
    spec.confidence = Some(1.8);
    let stored = storage.insert_detection(spec).await.unwrap();
    assert_eq!(stored.confidence, Some(1.0));
}

#[tokio::test]
async fn batch_fetch_dedupes_and_orders_by_time() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();

    let late = storage.insert_detection(new_detection("cam", 60)).await.unwrap();
    let early = storage.insert_detection(new_detection("cam", 0)).await.unwrap();
    let middle = storage.insert_detection(new_detection("cam", 30)).await.unwrap();

    let fetched = storage
        .batch_fetch_detections(
            &[late.id, early.id, middle.id, late.id, early.id],
            BatchFetchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(fetched.len(), 3, "duplicates are removed");
    let ids: Vec<i64> = fetched.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![early.id, middle.id, late.id]);
}

#[tokio::test]
async fn batch_fetch_splits_into_chunks() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();

    let mut ids = Vec::new();
    for i in 0..7 {
        ids.push(storage.insert_detection(new_detection("cam", i)).await.unwrap().id);
    }

    let fetched = storage
        .batch_fetch_detections(
            &ids,
            BatchFetchOptions {
                batch_size: 3,
                order_by_time: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(fetched.len(), 7);
}

#[tokio::test]
async fn batch_fetch_map_and_paths_variants() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();
    let a = storage.insert_detection(new_detection("cam", 0)).await.unwrap();
    let b = storage.insert_detection(new_detection("cam", 1)).await.unwrap();

    let map = storage
        .batch_fetch_detections_by_ids(&[a.id, b.id, 9999], BatchFetchOptions::default())
        .await
        .unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&a.id).unwrap().file_path, a.file_path);
    assert!(!map.contains_key(&9999));

    let paths = storage
        .batch_fetch_file_paths(&[a.id, b.id], BatchFetchOptions::default())
        .await
        .unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&a.file_path));
}

#[tokio::test]
async fn empty_id_list_fetches_nothing() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    let fetched = storage
        .batch_fetch_detections(&[], BatchFetchOptions::default())
        .await
        .unwrap();
    assert!(fetched.is_empty());
}

#[tokio::test]
async fn persist_event_writes_event_junction_and_enrichment() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();
    let detection = storage.insert_detection(new_detection("cam", 0)).await.unwrap();

    let enrichment_value = serde_json::json!({
        "license_plates": [{"text": "XYZ-999", "confidence": 0.85}]
    });
    let enrichment = HashMap::from([(
        detection.id,
        vigil_core::enrichment::EnrichmentData::from_value(&enrichment_value).unwrap(),
    )]);

    let event = storage
        .persist_event(new_event("b1", "cam", vec![detection.id]), &enrichment)
        .await
        .unwrap();

    assert_eq!(event.batch_id, "b1");
    assert_eq!(event.risk_score, 75);
    assert_eq!(event.risk_level, RiskLevel::High);
    assert_eq!(event.detection_ids, vec![detection.id]);

    assert_eq!(storage.detection_count_for_event(event.id).await.unwrap(), 1);

    let enriched = storage.get_detection(detection.id).await.unwrap().unwrap();
    let plates = enriched.enrichment_data.unwrap().license_plates.unwrap();
    assert_eq!(plates[0].text.as_deref(), Some("XYZ-999"));
}

#[tokio::test]
async fn persist_event_is_idempotent_per_batch_id() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();
    let detection = storage.insert_detection(new_detection("cam", 0)).await.unwrap();

    let first = storage
        .persist_event(new_event("b1", "cam", vec![detection.id]), &HashMap::new())
        .await
        .unwrap();
    let second = storage
        .persist_event(new_event("b1", "cam", vec![detection.id]), &HashMap::new())
        .await
        .unwrap();

    assert_eq!(first.id, second.id, "at most one live event per batch id");
    let found = storage.find_event_by_batch_id("b1").await.unwrap().unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
async fn junction_insert_is_idempotent() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();
    let detection = storage.insert_detection(new_detection("cam", 0)).await.unwrap();
    let event = storage
        .persist_event(new_event("b1", "cam", vec![]), &HashMap::new())
        .await
        .unwrap();

    storage
        .link_detection_to_event(event.id, detection.id)
        .await
        .unwrap();
    storage
        .link_detection_to_event(event.id, detection.id)
        .await
        .unwrap();

    assert_eq!(storage.detection_count_for_event(event.id).await.unwrap(), 1);
}

#[tokio::test]
async fn write_only_counts_and_recents() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();
    for i in 0..5 {
        storage.insert_detection(new_detection("cam", i)).await.unwrap();
    }
    storage
        .persist_event(new_event("b1", "cam", vec![]), &HashMap::new())
        .await
        .unwrap();

    assert_eq!(storage.detection_count_for_camera("cam").await.unwrap(), 5);
    assert_eq!(storage.event_count_for_camera("cam").await.unwrap(), 1);

    let recent = storage.recent_detections_for_camera("cam", 3).await.unwrap();
    assert_eq!(recent.len(), 3);
    // Newest first
    assert!(recent[0].detected_at >= recent[1].detected_at);
}

#[tokio::test]
async fn unlink_removes_exactly_one_row() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();
    let detection = storage.insert_detection(new_detection("cam", 0)).await.unwrap();
    let event = storage
        .persist_event(new_event("b1", "cam", vec![detection.id]), &HashMap::new())
        .await
        .unwrap();

    assert!(storage
        .unlink_detection_from_event(event.id, detection.id)
        .await
        .unwrap());
    assert!(!storage
        .unlink_detection_from_event(event.id, detection.id)
        .await
        .unwrap());
    assert_eq!(storage.detection_count_for_event(event.id).await.unwrap(), 0);
}

#[tokio::test]
async fn zones_and_baselines_round_trip() {
    let (storage, _dir) = create_test_storage().await.unwrap();
    storage
        .register_camera("cam", "Cam", "/data/cam")
        .await
        .unwrap();

    storage
        .upsert_zone(&vigil_core::context::Zone {
            id: "z1".to_string(),
            camera_id: "cam".to_string(),
            name: "Porch".to_string(),
            zone_type: "entry_point".to_string(),
        })
        .await
        .unwrap();
    storage
        .set_activity_baseline("cam", 14, "person", 2.5)
        .await
        .unwrap();

    let zones = storage.zones_for_camera("cam").await.unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].zone_type, "entry_point");

    let baseline = storage.activity_baseline("cam", 14).await.unwrap();
    assert_eq!(baseline.get("person"), Some(&2.5));
    assert!(storage.activity_baseline("cam", 3).await.unwrap().is_empty());
}
