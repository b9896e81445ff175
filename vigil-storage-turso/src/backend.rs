//! [`RelationalStore`] implementation delegating to the inherent methods

use crate::TursoStorage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use vigil_core::context::Zone;
use vigil_core::enrichment::EnrichmentData;
use vigil_core::models::{Camera, Detection, Event, NewDetection, NewEvent};
use vigil_core::storage::{BatchFetchOptions, RelationalStore};
use vigil_core::Result;

#[async_trait]
impl RelationalStore for TursoStorage {
    async fn get_camera(&self, camera_id: &str) -> Result<Option<Camera>> {
        TursoStorage::get_camera(self, camera_id).await
    }

    async fn insert_detection(&self, detection: NewDetection) -> Result<Detection> {
        TursoStorage::insert_detection(self, detection).await
    }

    async fn fetch_detections(
        &self,
        detection_ids: &[i64],
        options: BatchFetchOptions,
    ) -> Result<Vec<Detection>> {
        self.batch_fetch_detections(detection_ids, options).await
    }

    async fn fetch_detections_by_id(
        &self,
        detection_ids: &[i64],
    ) -> Result<HashMap<i64, Detection>> {
        self.batch_fetch_detections_by_ids(detection_ids, BatchFetchOptions::default())
            .await
    }

    async fn fetch_detection_paths(&self, detection_ids: &[i64]) -> Result<Vec<String>> {
        self.batch_fetch_file_paths(detection_ids, BatchFetchOptions::default())
            .await
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        TursoStorage::get_event(self, event_id).await
    }

    async fn find_event_by_batch_id(&self, batch_id: &str) -> Result<Option<Event>> {
        TursoStorage::find_event_by_batch_id(self, batch_id).await
    }

    async fn persist_event(
        &self,
        event: NewEvent,
        enrichment: &HashMap<i64, EnrichmentData>,
    ) -> Result<Event> {
        TursoStorage::persist_event(self, event, enrichment).await
    }

    async fn link_detection_to_event(&self, event_id: i64, detection_id: i64) -> Result<()> {
        TursoStorage::link_detection_to_event(self, event_id, detection_id).await
    }

    async fn detection_count_for_event(&self, event_id: i64) -> Result<u64> {
        TursoStorage::detection_count_for_event(self, event_id).await
    }

    async fn event_count_for_camera(&self, camera_id: &str) -> Result<u64> {
        TursoStorage::event_count_for_camera(self, camera_id).await
    }

    async fn zones_for_camera(&self, camera_id: &str) -> Result<Vec<Zone>> {
        TursoStorage::zones_for_camera(self, camera_id).await
    }

    async fn activity_baseline(
        &self,
        camera_id: &str,
        hour_of_day: u32,
    ) -> Result<HashMap<String, f64>> {
        TursoStorage::activity_baseline(self, camera_id, hour_of_day).await
    }

    async fn recent_events_for_camera(
        &self,
        camera_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        TursoStorage::recent_events_for_camera(self, camera_id, since, limit).await
    }

    async fn recent_detections_elsewhere(
        &self,
        exclude_camera_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Detection>> {
        TursoStorage::recent_detections_elsewhere(self, exclude_camera_id, since).await
    }
}
