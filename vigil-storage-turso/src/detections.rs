//! Detection CRUD

use crate::rows::{self, DETECTION_COLUMNS};
use crate::TursoStorage;
use tracing::debug;
use vigil_core::enrichment::EnrichmentData;
use vigil_core::models::{Detection, NewDetection};
use vigil_core::{Error, Result};

impl TursoStorage {
    /// Insert a detection and return the stored row
    pub async fn insert_detection(&self, detection: NewDetection) -> Result<Detection> {
        let detection = detection.normalized();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO detections (camera_id, file_path, file_type, detected_at, object_type, \
             confidence, bbox_x, bbox_y, bbox_width, bbox_height, media_type) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                detection.camera_id.clone(),
                detection.file_path.clone(),
                detection.file_type.clone(),
                rows::to_millis(detection.detected_at),
                detection.object_type.clone(),
                detection.confidence,
                detection.bbox.map(|b| b.x),
                detection.bbox.map(|b| b.y),
                detection.bbox.map(|b| b.width),
                detection.bbox.map(|b| b.height),
                detection.media_type.map(|m| m.as_str().to_string()),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to insert detection: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(detection_id = id, camera_id = %detection.camera_id, "inserted detection");
        self.get_detection(id)
            .await?
            .ok_or_else(|| Error::Storage(format!("inserted detection {id} not found")))
    }

    /// Fetch one detection by id
    pub async fn get_detection(&self, detection_id: i64) -> Result<Option<Detection>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {DETECTION_COLUMNS} FROM detections WHERE id = ?");
        let mut result = conn
            .query(&sql, libsql::params![detection_id])
            .await
            .map_err(|e| Error::Storage(format!("failed to query detection: {e}")))?;
        match result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch detection row: {e}")))?
        {
            Some(row) => Ok(Some(rows::row_to_detection(&row)?)),
            None => Ok(None),
        }
    }

    /// Write a detection's enrichment map
    pub async fn set_detection_enrichment(
        &self,
        detection_id: i64,
        enrichment: &EnrichmentData,
    ) -> Result<()> {
        let conn = self.connect()?;
        let payload = serde_json::to_string(&enrichment.to_value())?;
        conn.execute(
            "UPDATE detections SET enrichment_data = ? WHERE id = ?",
            libsql::params![payload, detection_id],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to write enrichment data: {e}")))?;
        Ok(())
    }
}
