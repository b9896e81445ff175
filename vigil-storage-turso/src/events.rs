//! Event persistence
//!
//! Event creation is the atomicity hot spot: the event row, its junction
//! rows, and the per-detection enrichment maps commit together. The
//! partial unique index on live `batch_id` plus INSERT OR IGNORE makes
//! creation idempotent under concurrent retries.

use crate::rows::{self, EVENT_COLUMNS};
use crate::{with_transaction, TursoStorage};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info};
use vigil_core::enrichment::EnrichmentData;
use vigil_core::models::{Event, NewEvent};
use vigil_core::{Error, Result};

impl TursoStorage {
    /// Fetch one event by id
    pub async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
        let mut result = conn
            .query(&sql, libsql::params![event_id])
            .await
            .map_err(|e| Error::Storage(format!("failed to query event: {e}")))?;
        match result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch event row: {e}")))?
        {
            Some(row) => Ok(Some(rows::row_to_event(&row)?)),
            None => Ok(None),
        }
    }

    /// Find the live event for a batch id
    pub async fn find_event_by_batch_id(&self, batch_id: &str) -> Result<Option<Event>> {
        let conn = self.connect()?;
        let sql =
            format!("SELECT {EVENT_COLUMNS} FROM events WHERE batch_id = ? AND deleted_at IS NULL");
        let mut result = conn
            .query(&sql, libsql::params![batch_id])
            .await
            .map_err(|e| Error::Storage(format!("failed to query event by batch: {e}")))?;
        match result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch event row: {e}")))?
        {
            Some(row) => Ok(Some(rows::row_to_event(&row)?)),
            None => Ok(None),
        }
    }

    /// Persist an event, its junction rows, and enrichment maps atomically
    ///
    /// When a live event already exists for the batch id, the existing
    /// event is returned and nothing else changes.
    pub async fn persist_event(
        &self,
        event: NewEvent,
        enrichment: &HashMap<i64, EnrichmentData>,
    ) -> Result<Event> {
        let conn = self.connect()?;
        let detection_ids_json = serde_json::to_string(&event.detection_ids)?;
        let now_ms = rows::to_millis(Utc::now());

        let stored = with_transaction(&conn, async {
            // INSERT OR IGNORE against the live-batch unique index: the
            // concurrent loser falls through to the SELECT below
            conn.execute(
                "INSERT OR IGNORE INTO events (batch_id, camera_id, started_at, ended_at, \
                 risk_score, risk_level, summary, reasoning, reviewed, is_fast_path, \
                 llm_prompt, detection_ids) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
                libsql::params![
                    event.batch_id.clone(),
                    event.camera_id.clone(),
                    rows::to_millis(event.started_at),
                    rows::to_millis(event.ended_at),
                    i64::from(event.risk_score),
                    event.risk_level.as_str().to_string(),
                    event.summary.clone(),
                    event.reasoning.clone(),
                    i64::from(event.is_fast_path),
                    event.llm_prompt.clone(),
                    detection_ids_json.clone(),
                ],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to insert event: {e}")))?;

            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE batch_id = ? AND deleted_at IS NULL"
            );
            let mut result = conn
                .query(&sql, libsql::params![event.batch_id.clone()])
                .await
                .map_err(|e| Error::Storage(format!("failed to read back event: {e}")))?;
            let row = result
                .next()
                .await
                .map_err(|e| Error::Storage(format!("failed to fetch event row: {e}")))?
                .ok_or_else(|| {
                    Error::Storage(format!("event for batch {} vanished", event.batch_id))
                })?;
            let stored = rows::row_to_event(&row)?;

            for detection_id in &event.detection_ids {
                conn.execute(
                    "INSERT OR IGNORE INTO event_detections (event_id, detection_id, created_at) \
                     VALUES (?, ?, ?)",
                    libsql::params![stored.id, *detection_id, now_ms],
                )
                .await
                .map_err(|e| Error::Storage(format!("failed to insert junction row: {e}")))?;
            }

            for (detection_id, data) in enrichment {
                let payload = serde_json::to_string(&data.to_value())?;
                conn.execute(
                    "UPDATE detections SET enrichment_data = ? WHERE id = ?",
                    libsql::params![payload, *detection_id],
                )
                .await
                .map_err(|e| Error::Storage(format!("failed to write enrichment data: {e}")))?;
            }

            Ok(stored)
        })
        .await?;

        if stored.detection_ids == event.detection_ids {
            info!(
                event_id = stored.id,
                batch_id = %stored.batch_id,
                risk_score = stored.risk_score,
                "persisted event"
            );
        } else {
            debug!(
                event_id = stored.id,
                batch_id = %stored.batch_id,
                "event already existed for batch, returning winner"
            );
        }
        Ok(stored)
    }

    /// Mark an event reviewed
    pub async fn set_event_reviewed(&self, event_id: i64, reviewed: bool) -> Result<bool> {
        let conn = self.connect()?;
        let affected = conn
            .execute(
                "UPDATE events SET reviewed = ? WHERE id = ? AND deleted_at IS NULL",
                libsql::params![i64::from(reviewed), event_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to update event: {e}")))?;
        Ok(affected > 0)
    }
}
