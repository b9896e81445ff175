//! # Vigil Storage - Redis
//!
//! Redis backend for the pipeline's shared mutable state:
//!
//! - ephemeral batch bookkeeping (`batch:*` key families)
//! - bounded FIFO work queues with DLQ / reject / drop-oldest overflow
//! - idempotency markers
//! - the `security_events` pub-sub channel
//!
//! Queues are lists under `queue:{name}`: RPUSH to produce, BLPOP to
//! consume, so FIFO order holds across multiple producers and consumers.
//!
//! ## Example
//!
//! ```no_run
//! use vigil_storage_redis::RedisStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = RedisStore::connect("redis://localhost:6379", 1000).await?;
//! # Ok(())
//! # }
//! ```

mod store;

use redis::aio::ConnectionManager;
use redis::RedisError;
use tracing::info;
use vigil_core::{Error, Result};

/// Retention applied to dead-letter queues unless overridden
const DEFAULT_DLQ_RETENTION: std::time::Duration = std::time::Duration::from_secs(86_400);

/// Redis-backed [`vigil_core::storage::KeyValueStore`]
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    max_queue_length: usize,
    dlq_retention: std::time::Duration,
}

pub(crate) fn map_redis_error(e: RedisError) -> Error {
    Error::KeyValue(e.to_string())
}

/// Redis key under which a named queue's list lives
pub(crate) fn queue_key(name: &str) -> String {
    format!("queue:{name}")
}

impl RedisStore {
    /// Connect with an auto-reconnecting connection manager
    pub async fn connect(connection_string: &str, max_queue_length: usize) -> Result<Self> {
        let client = redis::Client::open(connection_string).map_err(map_redis_error)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        info!("connected to redis");
        Ok(Self {
            manager,
            max_queue_length: max_queue_length.max(1),
            dlq_retention: DEFAULT_DLQ_RETENTION,
        })
    }

    /// Override how long dead-letter queues are retained
    #[must_use]
    pub fn with_dlq_retention(mut self, retention: std::time::Duration) -> Self {
        self.dlq_retention = retention;
        self
    }

    pub(crate) fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::queue_key;

    #[test]
    fn queue_keys_follow_the_family_layout() {
        assert_eq!(queue_key("analysis_queue"), "queue:analysis_queue");
        assert_eq!(
            queue_key(&vigil_core::storage::keys::dlq_name("analysis_queue")),
            "queue:dlq:analysis_queue"
        );
    }
}
