//! Write-only collection accessors
//!
//! Cameras own thousands of detections and events; these helpers insert,
//! update foreign keys, and COUNT without ever materializing a parent-side
//! collection.

use crate::rows::{self, DETECTION_COLUMNS, EVENT_COLUMNS};
use crate::TursoStorage;
use chrono::Utc;
use vigil_core::models::{Detection, Event};
use vigil_core::{Error, Result};

impl TursoStorage {
    /// Attach a detection to a camera by setting its foreign key
    pub async fn move_detection_to_camera(
        &self,
        detection_id: i64,
        camera_id: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE detections SET camera_id = ? WHERE id = ?",
            libsql::params![camera_id, detection_id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to move detection: {e}")))?;
        Ok(())
    }

    /// Link a detection to an event via the junction, ignoring duplicates
    pub async fn link_detection_to_event(&self, event_id: i64, detection_id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO event_detections (event_id, detection_id, created_at) \
             VALUES (?, ?, ?)",
            libsql::params![event_id, detection_id, rows::to_millis(Utc::now())],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to link detection to event: {e}")))?;
        Ok(())
    }

    /// Remove one junction row; true when a row was removed
    pub async fn unlink_detection_from_event(
        &self,
        event_id: i64,
        detection_id: i64,
    ) -> Result<bool> {
        let conn = self.connect()?;
        let affected = conn
            .execute(
                "DELETE FROM event_detections WHERE event_id = ? AND detection_id = ?",
                libsql::params![event_id, detection_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to unlink detection: {e}")))?;
        Ok(affected > 0)
    }

    async fn count_query(&self, sql: &str, params: Vec<libsql::Value>) -> Result<u64> {
        let conn = self.connect()?;
        let mut result = conn
            .query(sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| Error::Storage(format!("count query failed: {e}")))?;
        let row = result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("count row fetch failed: {e}")))?
            .ok_or_else(|| Error::Storage("count query returned no row".to_string()))?;
        let count: i64 = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    /// COUNT of junction rows for an event
    pub async fn detection_count_for_event(&self, event_id: i64) -> Result<u64> {
        self.count_query(
            "SELECT COUNT(*) FROM event_detections WHERE event_id = ?",
            vec![libsql::Value::Integer(event_id)],
        )
        .await
    }

    /// COUNT of live detections for a camera
    pub async fn detection_count_for_camera(&self, camera_id: &str) -> Result<u64> {
        self.count_query(
            "SELECT COUNT(*) FROM detections WHERE camera_id = ? AND deleted_at IS NULL",
            vec![libsql::Value::Text(camera_id.to_string())],
        )
        .await
    }

    /// COUNT of live events for a camera
    pub async fn event_count_for_camera(&self, camera_id: &str) -> Result<u64> {
        self.count_query(
            "SELECT COUNT(*) FROM events WHERE camera_id = ? AND deleted_at IS NULL",
            vec![libsql::Value::Text(camera_id.to_string())],
        )
        .await
    }

    /// Most recent live detections for a camera, bounded
    pub async fn recent_detections_for_camera(
        &self,
        camera_id: &str,
        limit: usize,
    ) -> Result<Vec<Detection>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {DETECTION_COLUMNS} FROM detections \
             WHERE camera_id = ? AND deleted_at IS NULL \
             ORDER BY detected_at DESC LIMIT ?"
        );
        let mut result = conn
            .query(&sql, libsql::params![camera_id, limit as i64])
            .await
            .map_err(|e| Error::Storage(format!("failed to query recent detections: {e}")))?;
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

    /// Most recent live events for a camera, bounded
    pub async fn recent_events_for_camera_limited(
        &self,
        camera_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE camera_id = ? AND deleted_at IS NULL \
             ORDER BY started_at DESC LIMIT ?"
        );
        let mut result = conn
            .query(&sql, libsql::params![camera_id, limit as i64])
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
}
