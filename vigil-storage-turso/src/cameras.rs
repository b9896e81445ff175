//! Camera CRUD

use crate::rows::{self, CAMERA_COLUMNS};
use crate::TursoStorage;
use chrono::Utc;
use tracing::debug;
use vigil_core::models::Camera;
use vigil_core::{Error, Result};

impl TursoStorage {
    /// Register a camera
    pub async fn insert_camera(&self, camera: &Camera) -> Result<()> {
        debug!(camera_id = %camera.id, "inserting camera");
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO cameras (id, name, folder_path, status, created_at, deleted_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                camera.id.clone(),
                camera.name.clone(),
                camera.folder_path.clone(),
                camera.status.clone(),
                rows::to_millis(camera.created_at),
                camera.deleted_at.map(rows::to_millis),
            ],
        )
        .await
        .map_err(|e| Error::Storage(format!("failed to insert camera: {e}")))?;
        Ok(())
    }

    /// Fetch a camera by id, tombstoned or live
    pub async fn get_camera(&self, camera_id: &str) -> Result<Option<Camera>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {CAMERA_COLUMNS} FROM cameras WHERE id = ?");
        let mut result = conn
            .query(&sql, libsql::params![camera_id])
            .await
            .map_err(|e| Error::Storage(format!("failed to query camera: {e}")))?;
        match result
            .next()
            .await
            .map_err(|e| Error::Storage(format!("failed to fetch camera row: {e}")))?
        {
            Some(row) => Ok(Some(rows::row_to_camera(&row)?)),
            None => Ok(None),
        }
    }

    /// Update a camera's status field
    pub async fn set_camera_status(&self, camera_id: &str, status: &str) -> Result<bool> {
        let conn = self.connect()?;
        let affected = conn
            .execute(
                "UPDATE cameras SET status = ? WHERE id = ? AND deleted_at IS NULL",
                libsql::params![status, camera_id],
            )
            .await
            .map_err(|e| Error::Storage(format!("failed to update camera status: {e}")))?;
        Ok(affected > 0)
    }

    /// Register a camera with defaults (test and bootstrap convenience)
    pub async fn register_camera(&self, camera_id: &str, name: &str, folder_path: &str) -> Result<Camera> {
        let camera = Camera {
            id: camera_id.to_string(),
            name: name.to_string(),
            folder_path: folder_path.to_string(),
            status: "active".to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        };
        self.insert_camera(&camera).await?;
        Ok(camera)
    }
}
