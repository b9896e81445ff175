//! Camera registration record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered camera
///
/// `folder_path` is unique among live (non-tombstoned) cameras; the
/// uniqueness is enforced by the storage layer with a partial index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub folder_path: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Camera {
    /// Whether this camera carries a soft-delete tombstone
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
