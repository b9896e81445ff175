//! In-memory [`RelationalStore`] for tests
//!
//! Implements the same contracts the Turso backend provides: bulk fetch
//! with dedup and time ordering, transactional event persistence with a
//! unique live event per batch id, conflict-ignoring junction inserts, and
//! the context enrichment queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use vigil_core::context::Zone;
use vigil_core::enrichment::EnrichmentData;
use vigil_core::models::{Camera, Detection, Event, NewDetection, NewEvent};
use vigil_core::storage::{
    clamp_fetch_batch_size, BatchFetchOptions, RelationalStore,
};
use vigil_core::{Error, Result};

#[derive(Default)]
struct StoreInner {
    cameras: HashMap<String, Camera>,
    detections: BTreeMap<i64, Detection>,
    events: BTreeMap<i64, Event>,
    junction: HashSet<(i64, i64)>,
    zones: HashMap<String, Vec<Zone>>,
    baselines: HashMap<(String, u32), HashMap<String, f64>>,
    next_detection_id: i64,
    next_event_id: i64,
}

/// In-memory relational store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a storage error (outage simulation)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Storage("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }

    /// Register a camera
    pub fn add_camera(&self, camera: Camera) {
        self.inner.lock().cameras.insert(camera.id.clone(), camera);
    }

    /// Insert a detection with an explicit id (fixture support)
    pub fn add_detection(&self, detection: Detection) {
        let mut inner = self.inner.lock();
        inner.next_detection_id = inner.next_detection_id.max(detection.id);
        inner.detections.insert(detection.id, detection);
    }

    /// Configure zones for a camera
    pub fn add_zones(&self, camera_id: &str, zones: Vec<Zone>) {
        self.inner.lock().zones.insert(camera_id.to_string(), zones);
    }

    /// Configure an activity baseline for a camera-hour
    pub fn add_baseline(&self, camera_id: &str, hour: u32, expected: HashMap<String, f64>) {
        self.inner
            .lock()
            .baselines
            .insert((camera_id.to_string(), hour), expected);
    }

    /// All events, id order (assertion support)
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.values().cloned().collect()
    }

    /// All junction pairs (assertion support)
    pub fn junction_rows(&self) -> Vec<(i64, i64)> {
        let mut rows: Vec<_> = self.inner.lock().junction.iter().copied().collect();
        rows.sort_unstable();
        rows
    }

    /// Fetch one detection (assertion support)
    pub fn detection(&self, id: i64) -> Option<Detection> {
        self.inner.lock().detections.get(&id).cloned()
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn get_camera(&self, camera_id: &str) -> Result<Option<Camera>> {
        self.check_available()?;
        Ok(self.inner.lock().cameras.get(camera_id).cloned())
    }

    async fn insert_detection(&self, detection: NewDetection) -> Result<Detection> {
        let mut inner = self.inner.lock();
        inner.next_detection_id += 1;
        let id = inner.next_detection_id;
        let stored = Detection {
            id,
            camera_id: detection.camera_id,
            file_path: detection.file_path,
            file_type: detection.file_type,
            detected_at: detection.detected_at,
            object_type: detection.object_type,
            confidence: detection.confidence,
            bbox: detection.bbox,
            thumbnail_path: None,
            media_type: detection.media_type,
            duration: None,
            video_codec: None,
            video_width: None,
            video_height: None,
            track_id: None,
            track_confidence: None,
            enrichment_data: None,
            deleted_at: None,
        };
        inner.detections.insert(id, stored.clone());
        Ok(stored)
    }

    async fn fetch_detections(
        &self,
        detection_ids: &[i64],
        options: BatchFetchOptions,
    ) -> Result<Vec<Detection>> {
        self.check_available()?;
        // Chunking is a wire-level concern; dedup and ordering are the
        // observable contract
        let _ = clamp_fetch_batch_size(options.batch_size);
        let unique: HashSet<i64> = detection_ids.iter().copied().collect();
        let inner = self.inner.lock();
        let mut found: Vec<Detection> = unique
            .iter()
            .filter_map(|id| inner.detections.get(id).cloned())
            .collect();
        if options.order_by_time {
            found.sort_by_key(|d| d.detected_at);
        } else {
            found.sort_by_key(|d| d.id);
        }
        Ok(found)
    }

    async fn fetch_detections_by_id(
        &self,
        detection_ids: &[i64],
    ) -> Result<HashMap<i64, Detection>> {
        let detections = self
            .fetch_detections(detection_ids, BatchFetchOptions {
                order_by_time: false,
                ..Default::default()
            })
            .await?;
        Ok(detections.into_iter().map(|d| (d.id, d)).collect())
    }

    async fn fetch_detection_paths(&self, detection_ids: &[i64]) -> Result<Vec<String>> {
        let detections = self
            .fetch_detections(detection_ids, BatchFetchOptions {
                order_by_time: false,
                ..Default::default()
            })
            .await?;
        Ok(detections.into_iter().map(|d| d.file_path).collect())
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        Ok(self.inner.lock().events.get(&event_id).cloned())
    }

    async fn find_event_by_batch_id(&self, batch_id: &str) -> Result<Option<Event>> {
        Ok(self
            .inner
            .lock()
            .events
            .values()
            .find(|e| e.batch_id == batch_id && !e.is_deleted())
            .cloned())
    }

    async fn persist_event(
        &self,
        event: NewEvent,
        enrichment: &HashMap<i64, EnrichmentData>,
    ) -> Result<Event> {
        self.check_available()?;
        let mut inner = self.inner.lock();

        // Unique live event per batch id: a concurrent retry gets the winner
        if let Some(existing) = inner
            .events
            .values()
            .find(|e| e.batch_id == event.batch_id && !e.is_deleted())
            .cloned()
        {
            return Ok(existing);
        }

        inner.next_event_id += 1;
        let id = inner.next_event_id;
        let stored = Event {
            id,
            batch_id: event.batch_id,
            camera_id: event.camera_id,
            started_at: event.started_at,
            ended_at: event.ended_at,
            risk_score: event.risk_score,
            risk_level: event.risk_level,
            summary: event.summary,
            reasoning: event.reasoning,
            reviewed: false,
            is_fast_path: event.is_fast_path,
            llm_prompt: event.llm_prompt,
            detection_ids: event.detection_ids.clone(),
            deleted_at: None,
        };
        inner.events.insert(id, stored.clone());

        for detection_id in &event.detection_ids {
            // Conflict-do-nothing on the composite key
            inner.junction.insert((id, *detection_id));
        }
        for (detection_id, data) in enrichment {
            if let Some(detection) = inner.detections.get_mut(detection_id) {
                detection.enrichment_data = Some(data.clone());
            }
        }
        Ok(stored)
    }

    async fn link_detection_to_event(&self, event_id: i64, detection_id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.events.contains_key(&event_id) {
            return Err(Error::Storage(format!("event {event_id} not found")));
        }
        inner.junction.insert((event_id, detection_id));
        Ok(())
    }

    async fn detection_count_for_event(&self, event_id: i64) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .junction
            .iter()
            .filter(|(e, _)| *e == event_id)
            .count() as u64)
    }

    async fn event_count_for_camera(&self, camera_id: &str) -> Result<u64> {
        Ok(self
            .inner
            .lock()
            .events
            .values()
            .filter(|e| e.camera_id == camera_id && !e.is_deleted())
            .count() as u64)
    }

    async fn zones_for_camera(&self, camera_id: &str) -> Result<Vec<Zone>> {
        Ok(self
            .inner
            .lock()
            .zones
            .get(camera_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn activity_baseline(
        &self,
        camera_id: &str,
        hour_of_day: u32,
    ) -> Result<HashMap<String, f64>> {
        Ok(self
            .inner
            .lock()
            .baselines
            .get(&(camera_id.to_string(), hour_of_day))
            .cloned()
            .unwrap_or_default())
    }

    async fn recent_events_for_camera(
        &self,
        camera_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.lock();
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| e.camera_id == camera_id && !e.is_deleted() && e.started_at >= since)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        events.truncate(limit);
        Ok(events)
    }

    async fn recent_detections_elsewhere(
        &self,
        exclude_camera_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Detection>> {
        Ok(self
            .inner
            .lock()
            .detections
            .values()
            .filter(|d| {
                d.camera_id != exclude_camera_id && !d.is_deleted() && d.detected_at >= since
            })
            .cloned()
            .collect())
    }
}
