//! # Storage Abstraction
//!
//! Unified traits for the two storage tiers the pipeline runs against:
//!
//! - [`KeyValueStore`] — the shared Redis-like store holding ephemeral
//!   batch state, bounded work queues, idempotency markers, and the
//!   pub-sub broadcast channel.
//! - [`RelationalStore`] — the durable database holding cameras,
//!   detections, events, and the event-detection junction.
//!
//! Production backends live in `vigil-storage-redis` and
//! `vigil-storage-turso`; in-memory implementations for tests live in
//! `test-utils`.

pub mod keys;

use crate::context::Zone;
use crate::enrichment::EnrichmentData;
use crate::models::{Camera, Detection, Event, NewDetection, NewEvent};
use crate::queue::{OverflowPolicy, QueuePushResult};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Smallest permitted fetch chunk
pub const MIN_FETCH_BATCH_SIZE: usize = 1;
/// Default ids per containment query
pub const DEFAULT_FETCH_BATCH_SIZE: usize = 250;
/// Largest permitted fetch chunk
pub const MAX_FETCH_BATCH_SIZE: usize = 1000;

/// Clamp a requested fetch chunk size into the supported range
pub fn clamp_fetch_batch_size(batch_size: usize) -> usize {
    batch_size.clamp(MIN_FETCH_BATCH_SIZE, MAX_FETCH_BATCH_SIZE)
}

/// Options for bulk detection fetches
#[derive(Debug, Clone, Copy)]
pub struct BatchFetchOptions {
    /// Maximum ids per containment query, clamped to the supported range
    pub batch_size: usize,
    /// Order results by `detected_at` ascending
    pub order_by_time: bool,
}

impl Default for BatchFetchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_FETCH_BATCH_SIZE,
            order_by_time: true,
        }
    }
}

/// Redis-like store: keys, atomic lists, bounded queues, pub-sub
///
/// Contract notes:
/// - `set_many` must make its writes observable together (pipelined
///   transaction on the wire).
/// - `list_append` is a single atomic round-trip, never read-modify-write.
/// - `scan_keys` must use non-blocking cursor scanning, never a blocking
///   list-all-keys primitive.
/// - `pop_queue` blocks up to `timeout`; callers must not hold an
///   inference permit across it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Set only when the key is absent; returns whether the write won
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool>;

    /// Pipelined multi-set; writes become observable together
    async fn set_many(&self, pairs: &[(String, String)]) -> Result<()>;

    /// Pipelined multi-get, one slot per requested key
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Delete all the given keys atomically
    async fn delete(&self, keys: &[String]) -> Result<()>;

    /// Atomic right-push; returns the new list length
    async fn list_append(&self, key: &str, value: &str) -> Result<u64>;

    /// Full contents of a list, in insertion order
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;

    async fn list_len(&self, key: &str) -> Result<u64>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Cursor-scan keys matching a glob pattern, in pages of ~100
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Guarded queue push applying the overflow policy at capacity
    async fn push_queue(
        &self,
        queue: &str,
        item: &str,
        policy: OverflowPolicy,
    ) -> Result<QueuePushResult>;

    /// Blocking FIFO pop with a timeout; `None` on timeout
    async fn pop_queue(&self, queue: &str, timeout: Duration) -> Result<Option<String>>;

    async fn queue_len(&self, queue: &str) -> Result<u64>;

    /// Publish a message on a pub-sub channel (at-least-once)
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;
}

/// Durable relational store for the camera / detection / event hierarchy
///
/// Collection access is write-only: implementations insert rows, update
/// foreign keys, and run COUNT queries, but never materialize a parent's
/// full child collection.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn get_camera(&self, camera_id: &str) -> Result<Option<Camera>>;

    /// Insert a detection and return the stored row
    async fn insert_detection(&self, detection: NewDetection) -> Result<Detection>;

    /// Bulk-fetch detections by id: deduplicates, chunks into containment
    /// queries, optionally orders by `detected_at` ascending
    async fn fetch_detections(
        &self,
        detection_ids: &[i64],
        options: BatchFetchOptions,
    ) -> Result<Vec<Detection>>;

    /// Bulk-fetch returning an id-keyed map for O(1) lookup
    async fn fetch_detections_by_id(
        &self,
        detection_ids: &[i64],
    ) -> Result<HashMap<i64, Detection>>;

    /// Bulk-fetch only file paths
    async fn fetch_detection_paths(&self, detection_ids: &[i64]) -> Result<Vec<String>>;

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>>;

    /// Find the live event for a batch id, if one exists
    async fn find_event_by_batch_id(&self, batch_id: &str) -> Result<Option<Event>>;

    /// Persist an event, its junction rows, and per-detection enrichment
    /// maps in one transaction
    ///
    /// Junction inserts are conflict-do-nothing. When a live event already
    /// exists for the batch id (concurrent retry), the existing event is
    /// returned instead of a duplicate.
    async fn persist_event(
        &self,
        event: NewEvent,
        enrichment: &HashMap<i64, EnrichmentData>,
    ) -> Result<Event>;

    /// Insert one junction row, ignoring duplicates
    async fn link_detection_to_event(&self, event_id: i64, detection_id: i64) -> Result<()>;

    /// COUNT of junction rows for an event
    async fn detection_count_for_event(&self, event_id: i64) -> Result<u64>;

    /// COUNT of live events for a camera
    async fn event_count_for_camera(&self, camera_id: &str) -> Result<u64>;

    /// Zones configured for a camera
    async fn zones_for_camera(&self, camera_id: &str) -> Result<Vec<Zone>>;

    /// Expected detection count per object class for a camera-hour
    async fn activity_baseline(
        &self,
        camera_id: &str,
        hour_of_day: u32,
    ) -> Result<HashMap<String, f64>>;

    /// Most recent live events for a camera since a cutoff
    async fn recent_events_for_camera(
        &self,
        camera_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Event>>;

    /// Live detections on other cameras since a cutoff (cross-camera window)
    async fn recent_detections_elsewhere(
        &self,
        exclude_camera_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Detection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_batch_size_is_clamped() {
        assert_eq!(clamp_fetch_batch_size(0), 1);
        assert_eq!(clamp_fetch_batch_size(250), 250);
        assert_eq!(clamp_fetch_batch_size(5000), 1000);
    }
}
