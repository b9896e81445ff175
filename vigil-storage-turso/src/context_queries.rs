//! Context enrichment queries

use crate::rows::{self, DETECTION_COLUMNS, EVENT_COLUMNS};
use crate::TursoStorage;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use vigil_core::context::Zone;
use vigil_core::models::{Detection, Event};
use vigil_core::{Error, Result};

impl TursoStorage {
    /// Zones configured for a camera
    pub async fn zones_for_camera(&self, camera_id: &str) -> Result<Vec<Zone>> {
        let conn = self.connect()?;
        let mut result = conn
            .query(
                "SELECT id, camera_id, name, zone_type FROM zones WHERE camera_id = ?",
                libsql::params![camera_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query zones: {e}")))?;
        let mut zones = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch zone row: {e}")))?
        {
            zones.push(rows::row_to_zone(&row)?);
        }
        Ok(zones)
    }

    /// Insert or replace a zone definition
    pub async fn upsert_zone(&self, zone: &Zone) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO zones (id, camera_id, name, zone_type) VALUES (?, ?, ?, ?)",
            libsql::params![
                zone.id.clone(),
                zone.camera_id.clone(),
                zone.name.clone(),
                zone.zone_type.clone(),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to upsert zone: {e}")))?;
        Ok(())
    }

    /// Expected detection count per object class for a camera-hour
    pub async fn activity_baseline(
        &self,
        camera_id: &str,
        hour_of_day: u32,
    ) -> Result<HashMap<String, f64>> {
        let conn = self.connect()?;
        let mut result = conn
            .query(
                "SELECT object_type, expected_count FROM activity_baselines \
                 WHERE camera_id = ? AND hour_of_day = ?",
                libsql::params![camera_id, i64::from(hour_of_day)],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query baselines: {e}")))?;
        let mut baseline = HashMap::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch baseline row: {e}")))?
        {
            let object_type: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let expected: f64 = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            baseline.insert(object_type, expected);
        }
        Ok(baseline)
    }

    /// Upsert one baseline row
    pub async fn set_activity_baseline(
        &self,
        camera_id: &str,
        hour_of_day: u32,
        object_type: &str,
        expected_count: f64,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO activity_baselines \
             (camera_id, hour_of_day, object_type, expected_count) VALUES (?, ?, ?, ?)",
            libsql::params![camera_id, i64::from(hour_of_day), object_type, expected_count],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to set baseline: {e}")))?;
        Ok(())
    }

    /// Live events for a camera since a cutoff, newest first
    pub async fn recent_events_for_camera(
        &self,
        camera_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE camera_id = ? AND deleted_at IS NULL AND started_at >= ? \
             ORDER BY started_at DESC LIMIT ?"
        );
        let mut result = conn
            .query(
                &sql,
                libsql::params![camera_id, rows::to_millis(since), limit as i64],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query recent events: {e}")))?;
        let mut events = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch event row: {e}")))?
        {
            events.push(rows::row_to_event(&row)?);
        }
        Ok(events)
    }

    /// Live detections on other cameras since a cutoff
    pub async fn recent_detections_elsewhere(
        &self,
        exclude_camera_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Detection>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE camera_id != ? AND deleted_at IS NULL AND detected_at >= ?"
        );
        let mut result = conn
            .query(
                &sql,
                libsql::params![exclude_camera_id, rows::to_millis(since)],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to query cross-camera activity: {e}")))?;
        let mut detections = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch detection row: {e}")))?
        {
            detections.push(rows::row_to_detection(&row)?);
        }
        Ok(detections)
    }
}
