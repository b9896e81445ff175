//! Bulk detection fetching
//!
//! Avoids N+1 queries: deduplicates the requested ids, splits them into
//! bounded chunks, and runs one containment query per chunk.

use crate::rows::{self, DETECTION_COLUMNS};
use crate::TursoStorage;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use vigil_core::models::Detection;
use vigil_core::storage::{clamp_fetch_batch_size, BatchFetchOptions};
use vigil_core::{Error, Result};

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

impl TursoStorage {
    /// Fetch detections by id with dedup, chunking, and optional time order
    pub async fn batch_fetch_detections(
        &self,
        detection_ids: &[i64],
        options: BatchFetchOptions,
    ) -> Result<Vec<Detection>> {
        if detection_ids.is_empty() {
            debug!("batch fetch called with empty id list");
            return Ok(Vec::new());
        }

        let unique: Vec<i64> = {
            let mut seen = HashSet::new();
            detection_ids
                .iter()
                .copied()
                .filter(|id| seen.insert(*id))
                .collect()
        };
        let chunk_size = clamp_fetch_batch_size(options.batch_size);
        if unique.len() != detection_ids.len() {
            debug!(
                requested = detection_ids.len(),
                unique = unique.len(),
                "deduplicated detection ids"
            );
        }

        let conn = self.connect()?;
        let mut detections = Vec::with_capacity(unique.len());
        let mut chunk_count = 0usize;

        for chunk in unique.chunks(chunk_size) {
            chunk_count += 1;
            let sql = format!(
                "SELECT {DETECTION_COLUMNS} FROM detections WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut result = conn
                .query(&sql, libsql::params_from_iter(chunk.iter().copied()))
                .await
                .map_err(|e| Error::Storage(format!("failed to batch fetch detections: {e}")))?;
            while let Some(row) = result
                .next()
                .await
                .map_err(|e| Error::Storage(format!("failed to fetch detection row: {e}")))?
            {
                detections.push(rows::row_to_detection(&row)?);
            }
        }

        if options.order_by_time {
            detections.sort_by_key(|d| d.detected_at);
        }

        debug!(
            fetched = detections.len(),
            requested = unique.len(),
            chunks = chunk_count,
            "batch fetch completed"
        );
        Ok(detections)
    }

    /// Bulk fetch returning an id-keyed map
    pub async fn batch_fetch_detections_by_ids(
        &self,
        detection_ids: &[i64],
        options: BatchFetchOptions,
    ) -> Result<HashMap<i64, Detection>> {
        let detections = self
            .batch_fetch_detections(
                detection_ids,
                BatchFetchOptions {
                    order_by_time: false,
                    ..options
                },
            )
            .await?;
        Ok(detections.into_iter().map(|d| (d.id, d)).collect())
    }

    /// Bulk fetch of file paths only
    pub async fn batch_fetch_file_paths(
        &self,
        detection_ids: &[i64],
        options: BatchFetchOptions,
    ) -> Result<Vec<String>> {
        if detection_ids.is_empty() {
            return Ok(Vec::new());
        }
        let unique: Vec<i64> = {
            let mut seen = HashSet::new();
            detection_ids
                .iter()
                .copied()
                .filter(|id| seen.insert(*id))
                .collect()
        };
        let chunk_size = clamp_fetch_batch_size(options.batch_size);

        let conn = self.connect()?;
        let mut paths = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(chunk_size) {
            let sql = format!(
                "SELECT file_path FROM detections WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut result = conn
                .query(&sql, libsql::params_from_iter(chunk.iter().copied()))
                .await
                .map_err(|e| Error::Storage(format!("failed to fetch file paths: {e}")))?;
            while let Some(row) = result
                .next()
                .await
                .map_err(|e| Error::Storage(format!("failed to fetch path row: {e}")))?
            {
                let path: Option<String> = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
                if let Some(path) = path {
                    paths.push(path);
                }
            }
        }
        debug!(fetched = paths.len(), requested = unique.len(), "fetched file paths");
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::placeholders;

    #[test]
    fn placeholder_list_matches_count() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
