//! [`KeyValueStore`] implementation over the connection manager

use crate::{map_redis_error, queue_key, RedisStore};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};
use vigil_core::queue::{OverflowPolicy, QueuePushResult};
use vigil_core::storage::KeyValueStore;
use vigil_core::Result;

/// Keys fetched per SCAN round trip
const SCAN_PAGE_SIZE: usize = 100;

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(map_redis_error)
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.connection();
        conn.set_nx::<_, _, bool>(key, value)
            .await
            .map_err(map_redis_error)
    }

    async fn set_many(&self, pairs: &[(String, String)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in pairs {
            pipe.set(key, value).ignore();
        }
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(key);
        }
        pipe.query_async::<Vec<Option<String>>>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection();
        conn.del::<_, ()>(keys.to_vec())
            .await
            .map_err(map_redis_error)
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<u64> {
        let mut conn = self.connection();
        conn.rpush::<_, _, u64>(key, value)
            .await
            .map_err(map_redis_error)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection();
        conn.lrange::<_, Vec<String>>(key, 0, -1)
            .await
            .map_err(map_redis_error)
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection();
        conn.llen::<_, u64>(key).await.map_err(map_redis_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection();
        conn.expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(map_redis_error)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        // Cursor scanning only; KEYS would block the server
        let mut conn = self.connection();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn push_queue(
        &self,
        queue: &str,
        item: &str,
        policy: OverflowPolicy,
    ) -> Result<QueuePushResult> {
        let key = queue_key(queue);
        let mut conn = self.connection();
        let mut result = QueuePushResult::default();

        let length: u64 = conn.llen(&key).await.map_err(map_redis_error)?;
        if length >= self.max_queue_length as u64 {
            match policy {
                OverflowPolicy::Reject => {
                    return Ok(QueuePushResult {
                        success: false,
                        queue_length: length,
                        error: Some(format!("queue {queue} is full ({length} items)")),
                        ..Default::default()
                    });
                }
                OverflowPolicy::DropOldest => {
                    let dropped: Option<String> =
                        conn.lpop(&key, None).await.map_err(map_redis_error)?;
                    if dropped.is_some() {
                        result.dropped_count = 1;
                        result.warning = Some(format!("queue {queue} full, dropped oldest item"));
                        warn!(queue, "queue full, dropped oldest item");
                    }
                }
                OverflowPolicy::Dlq => {
                    let moved: Option<String> =
                        conn.lpop(&key, None).await.map_err(map_redis_error)?;
                    if let Some(moved) = moved {
                        let dlq_key = queue_key(&vigil_core::storage::keys::dlq_name(queue));
                        conn.rpush::<_, _, ()>(&dlq_key, moved)
                            .await
                            .map_err(map_redis_error)?;
                        conn.expire::<_, ()>(&dlq_key, self.dlq_retention.as_secs() as i64)
                            .await
                            .map_err(map_redis_error)?;
                        result.moved_to_dlq_count = 1;
                        result.warning =
                            Some(format!("queue {queue} full, moved oldest item to DLQ"));
                        warn!(queue, "queue full, moved oldest item to DLQ");
                    }
                }
            }
        }

        let new_length: u64 = conn
            .rpush(&key, item)
            .await
            .map_err(map_redis_error)?;
        if queue.starts_with("dlq:") {
            conn.expire::<_, ()>(&key, self.dlq_retention.as_secs() as i64)
                .await
                .map_err(map_redis_error)?;
        }
        result.success = true;
        result.queue_length = new_length;
        debug!(queue, queue_length = new_length, "pushed queue item");
        Ok(result)
    }

    async fn pop_queue(&self, queue: &str, timeout: Duration) -> Result<Option<String>> {
        let key = queue_key(queue);
        let mut conn = self.connection();
        // BLPOP with sub-second resolution; 0 would block forever
        let timeout_secs = timeout.as_secs_f64().max(0.1);
        let popped: Option<(String, String)> = conn
            .blpop(&key, timeout_secs)
            .await
            .map_err(map_redis_error)?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn queue_len(&self, queue: &str) -> Result<u64> {
        self.list_len(&queue_key(queue)).await
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.connection();
        conn.publish::<_, _, ()>(channel, message)
            .await
            .map_err(map_redis_error)
    }
}
