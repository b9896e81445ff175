//! Cascade soft delete
//!
//! Tombstones propagate camera → events → detections, and event →
//! detections through the junction. A detection shared with another live
//! event is preserved. Restore is windowed: only rows tombstoned at or
//! after the parent's `deleted_at` come back, so rows deleted earlier by
//! unrelated operations stay deleted.

use crate::rows;
use crate::{with_transaction, TursoStorage};
use chrono::Utc;
use libsql::Connection;
use std::sync::Arc;
use tracing::{debug, info};
use vigil_core::{Error, Result};

/// Result of one cascade operation
///
/// For restores the `*_affected` fields count restored rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub parent_deleted: bool,
    pub events_affected: u64,
    pub detections_affected: u64,
}

impl CascadeOutcome {
    /// Total rows touched including the parent
    pub fn total(&self) -> u64 {
        u64::from(self.parent_deleted) + self.events_affected + self.detections_affected
    }

    fn noop() -> Self {
        Self::default()
    }
}

/// Service applying tombstones and restores across the hierarchy
pub struct CascadeSoftDeleteService {
    storage: Arc<TursoStorage>,
}

async fn execute(conn: &Connection, sql: &str, params: Vec<libsql::Value>) -> Result<u64> {
    conn.execute(sql, libsql::params_from_iter(params))
        .await
        .map_err(|e| Error::Storage(format!("cascade statement failed: {e}")))
}

fn text(value: &str) -> libsql::Value {
    libsql::Value::Text(value.to_string())
}

fn integer(value: i64) -> libsql::Value {
    libsql::Value::Integer(value)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl CascadeSoftDeleteService {
    pub fn new(storage: Arc<TursoStorage>) -> Self {
        Self { storage }
    }

    /// Soft delete a camera and, with cascade, its events and detections
    ///
    /// All tombstones share one timestamp so a later restore can identify
    /// exactly the rows this operation touched.
    pub async fn soft_delete_camera(&self, camera_id: &str, cascade: bool) -> Result<CascadeOutcome> {
        let camera = self
            .storage
            .get_camera(camera_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("camera {camera_id} not found")))?;
        if camera.is_deleted() {
            debug!(camera_id, "camera already soft-deleted");
            return Ok(CascadeOutcome::noop());
        }

        let now_ms = rows::to_millis(Utc::now());
        let conn = self.storage.connect()?;

        let outcome = with_transaction(&conn, async {
            let mut events_affected = 0;
            let mut detections_affected = 0;
            if cascade {
                events_affected = execute(
                    &conn,
                    "UPDATE events SET deleted_at = ? \
                     WHERE camera_id = ? AND deleted_at IS NULL",
                    vec![integer(now_ms), text(camera_id)],
                )
                .await?;
                detections_affected = execute(
                    &conn,
                    "UPDATE detections SET deleted_at = ? \
                     WHERE camera_id = ? AND deleted_at IS NULL",
                    vec![integer(now_ms), text(camera_id)],
                )
                .await?;
            }
            execute(
                &conn,
                "UPDATE cameras SET deleted_at = ? WHERE id = ?",
                vec![integer(now_ms), text(camera_id)],
            )
            .await?;
            Ok(CascadeOutcome {
                parent_deleted: true,
                events_affected,
                detections_affected,
            })
        })
        .await?;

        info!(
            camera_id,
            cascade,
            events = outcome.events_affected,
            detections = outcome.detections_affected,
            "soft deleted camera"
        );
        Ok(outcome)
    }

    /// Soft delete an event and, with cascade, its exclusive detections
    ///
    /// Detections shared with another live event are preserved.
    pub async fn soft_delete_event(&self, event_id: i64, cascade: bool) -> Result<CascadeOutcome> {
        let event = self
            .storage
            .get_event(event_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("event {event_id} not found")))?;
        if event.is_deleted() {
            debug!(event_id, "event already soft-deleted");
            return Ok(CascadeOutcome::noop());
        }

        let now_ms = rows::to_millis(Utc::now());
        let conn = self.storage.connect()?;

        let outcome = with_transaction(&conn, async {
            let mut detections_affected = 0;
            if cascade {
                detections_affected = execute(
                    &conn,
                    "UPDATE detections SET deleted_at = ? \
                     WHERE deleted_at IS NULL \
                       AND id IN (SELECT detection_id FROM event_detections WHERE event_id = ?) \
                       AND id NOT IN ( \
                           SELECT DISTINCT ed.detection_id \
                           FROM event_detections ed \
                           JOIN events e ON ed.event_id = e.id \
                           WHERE ed.event_id != ? AND e.deleted_at IS NULL)",
                    vec![integer(now_ms), integer(event_id), integer(event_id)],
                )
                .await?;
            }
            execute(
                &conn,
                "UPDATE events SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
                vec![integer(now_ms), integer(event_id)],
            )
            .await?;
            Ok(CascadeOutcome {
                parent_deleted: true,
                events_affected: 0,
                detections_affected,
            })
        })
        .await?;

        info!(
            event_id,
            cascade,
            detections = outcome.detections_affected,
            "soft deleted event"
        );
        Ok(outcome)
    }

    /// Bulk soft delete of events
    ///
    /// A detection is tombstoned only when every live event referencing it
    /// is in the deleted set.
    pub async fn soft_delete_events_bulk(
        &self,
        event_ids: &[i64],
        cascade: bool,
    ) -> Result<CascadeOutcome> {
        if event_ids.is_empty() {
            return Ok(CascadeOutcome::noop());
        }

        let now_ms = rows::to_millis(Utc::now());
        let conn = self.storage.connect()?;
        let marks = placeholders(event_ids.len());

        let outcome = with_transaction(&conn, async {
            let mut detections_affected = 0;
            if cascade {
                // Exclusive detections: linked to the deleted set, not
                // linked to any live event outside it
                let sql = format!(
                    "UPDATE detections SET deleted_at = ? \
                     WHERE deleted_at IS NULL \
                       AND id IN (SELECT detection_id FROM event_detections \
                                  WHERE event_id IN ({marks})) \
                       AND id NOT IN ( \
                           SELECT DISTINCT ed.detection_id \
                           FROM event_detections ed \
                           JOIN events e ON ed.event_id = e.id \
                           WHERE ed.event_id NOT IN ({marks}) AND e.deleted_at IS NULL)"
                );
                let mut params: Vec<libsql::Value> = vec![integer(now_ms)];
                params.extend(event_ids.iter().map(|id| integer(*id)));
                params.extend(event_ids.iter().map(|id| integer(*id)));
                detections_affected = execute(&conn, &sql, params).await?;
            }

            let sql = format!(
                "UPDATE events SET deleted_at = ? \
                 WHERE id IN ({marks}) AND deleted_at IS NULL"
            );
            let mut params: Vec<libsql::Value> = vec![integer(now_ms)];
            params.extend(event_ids.iter().map(|id| integer(*id)));
            let events_affected = execute(&conn, &sql, params).await?;

            Ok(CascadeOutcome {
                parent_deleted: events_affected > 0,
                events_affected,
                detections_affected,
            })
        })
        .await?;

        info!(
            requested = event_ids.len(),
            events = outcome.events_affected,
            detections = outcome.detections_affected,
            cascade,
            "bulk soft deleted events"
        );
        Ok(outcome)
    }

    /// Restore a camera and, with cascade, rows tombstoned by its delete
    pub async fn restore_camera(&self, camera_id: &str, cascade: bool) -> Result<CascadeOutcome> {
        let camera = self
            .storage
            .get_camera(camera_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("camera {camera_id} not found")))?;
        let Some(deleted_at) = camera.deleted_at else {
            debug!(camera_id, "camera not soft-deleted, nothing to restore");
            return Ok(CascadeOutcome::noop());
        };
        let deleted_at_ms = rows::to_millis(deleted_at);

        let conn = self.storage.connect()?;
        let outcome = with_transaction(&conn, async {
            let mut events_affected = 0;
            let mut detections_affected = 0;
            if cascade {
                // Same-operation window: only rows tombstoned at or after
                // the camera's own deletion come back
                events_affected = execute(
                    &conn,
                    "UPDATE events SET deleted_at = NULL \
                     WHERE camera_id = ? AND deleted_at IS NOT NULL AND deleted_at >= ?",
                    vec![text(camera_id), integer(deleted_at_ms)],
                )
                .await?;
                detections_affected = execute(
                    &conn,
                    "UPDATE detections SET deleted_at = NULL \
                     WHERE camera_id = ? AND deleted_at IS NOT NULL AND deleted_at >= ?",
                    vec![text(camera_id), integer(deleted_at_ms)],
                )
                .await?;
            }
            execute(
                &conn,
                "UPDATE cameras SET deleted_at = NULL WHERE id = ?",
                vec![text(camera_id)],
            )
            .await?;
            Ok(CascadeOutcome {
                parent_deleted: true,
                events_affected,
                detections_affected,
            })
        })
        .await?;

        info!(
            camera_id,
            cascade,
            events = outcome.events_affected,
            detections = outcome.detections_affected,
            "restored camera"
        );
        Ok(outcome)
    }

    /// Restore an event and, with cascade, its windowed detections
    pub async fn restore_event(&self, event_id: i64, cascade: bool) -> Result<CascadeOutcome> {
        let event = self
            .storage
            .get_event(event_id)
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("event {event_id} not found")))?;
        let Some(deleted_at) = event.deleted_at else {
            debug!(event_id, "event not soft-deleted, nothing to restore");
            return Ok(CascadeOutcome::noop());
        };
        let deleted_at_ms = rows::to_millis(deleted_at);

        let conn = self.storage.connect()?;
        let outcome = with_transaction(&conn, async {
            let mut detections_affected = 0;
            if cascade {
                detections_affected = execute(
                    &conn,
                    "UPDATE detections SET deleted_at = NULL \
                     WHERE deleted_at IS NOT NULL AND deleted_at >= ? \
                       AND id IN (SELECT detection_id FROM event_detections WHERE event_id = ?)",
                    vec![integer(deleted_at_ms), integer(event_id)],
                )
                .await?;
            }
            execute(
                &conn,
                "UPDATE events SET deleted_at = NULL WHERE id = ?",
                vec![integer(event_id)],
            )
            .await?;
            Ok(CascadeOutcome {
                parent_deleted: true,
                events_affected: 0,
                detections_affected,
            })
        })
        .await?;

        info!(
            event_id,
            cascade,
            detections = outcome.detections_affected,
            "restored event"
        );
        Ok(outcome)
    }
}
