//! In-memory [`KeyValueStore`] for tests
//!
//! Mirrors the redis backend's semantics closely enough to exercise the
//! aggregator and workers: atomic list appends, set-if-absent, glob key
//! scans, bounded queues with overflow policies, and a recorded pub-sub
//! channel for assertions. A failure switch simulates a store outage.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use vigil_core::queue::{OverflowPolicy, QueuePushResult};
use vigil_core::storage::keys;
use vigil_core::storage::KeyValueStore;
use vigil_core::{Error, Result};

#[derive(Default)]
struct KvInner {
    strings: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    queues: HashMap<String, VecDeque<String>>,
}

/// In-memory key-value store
pub struct MemoryKv {
    inner: Mutex<KvInner>,
    published: Mutex<Vec<(String, String)>>,
    queue_notify: Notify,
    max_queue_length: usize,
    failing: AtomicBool,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl MemoryKv {
    pub fn new(max_queue_length: usize) -> Self {
        Self {
            inner: Mutex::new(KvInner::default()),
            published: Mutex::new(Vec::new()),
            queue_notify: Notify::new(),
            max_queue_length,
            failing: AtomicBool::new(false),
        }
    }

    /// Make every operation fail with a key-value error (outage simulation)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::KeyValue("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }

    /// Messages published so far, as (channel, payload) pairs
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().clone()
    }

    /// Snapshot of a queue's contents, oldest first
    pub fn queue_contents(&self, queue: &str) -> Vec<String> {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All string keys currently present
    pub fn string_keys(&self) -> Vec<String> {
        self.inner.lock().strings.keys().cloned().collect()
    }

    /// Whether any key (string or list) exists for a batch id
    pub fn has_batch_keys(&self, batch_id: &str) -> bool {
        let inner = self.inner.lock();
        let prefix = format!("batch:{batch_id}:");
        inner.strings.keys().any(|k| k.starts_with(&prefix))
            || inner.lists.keys().any(|k| k.starts_with(&prefix))
    }
}

/// Single-`*` glob match, enough for the `batch:*:current` pattern
fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == key,
        Some((prefix, suffix)) => {
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.inner.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        self.inner
            .lock()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        if inner.strings.contains_key(key) {
            Ok(false)
        } else {
            inner.strings.insert(key.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn set_many(&self, pairs: &[(String, String)]) -> Result<()> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        for (key, value) in pairs {
            inner.strings.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check_available()?;
        let inner = self.inner.lock();
        Ok(keys.iter().map(|k| inner.strings.get(k).cloned()).collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        for key in keys {
            inner.strings.remove(key);
            inner.lists.remove(key);
        }
        Ok(())
    }

    async fn list_append(&self, key: &str, value: &str) -> Result<u64> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push(value.to_string());
        Ok(list.len() as u64)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self.inner.lock().lists.get(key).cloned().unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        self.check_available()?;
        Ok(self
            .inner
            .lock()
            .lists
            .get(key)
            .map(|l| l.len() as u64)
            .unwrap_or(0))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<()> {
        self.check_available()
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let inner = self.inner.lock();
        let mut matched: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.lists.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        matched.sort();
        matched.dedup();
        Ok(matched)
    }

    async fn push_queue(
        &self,
        queue: &str,
        item: &str,
        policy: OverflowPolicy,
    ) -> Result<QueuePushResult> {
        self.check_available()?;
        let mut result = QueuePushResult::default();
        {
            let mut inner = self.inner.lock();

            let overflow = {
                let q = inner.queues.entry(queue.to_string()).or_default();
                q.len() >= self.max_queue_length
            };
            if overflow {
                match policy {
                    OverflowPolicy::Reject => {
                        let len = inner.queues.get(queue).map(VecDeque::len).unwrap_or(0);
                        return Ok(QueuePushResult {
                            success: false,
                            queue_length: len as u64,
                            error: Some(format!("queue {queue} is full")),
                            ..Default::default()
                        });
                    }
                    OverflowPolicy::DropOldest => {
                        if let Some(q) = inner.queues.get_mut(queue) {
                            q.pop_front();
                        }
                        result.dropped_count = 1;
                        result.warning = Some(format!("queue {queue} full, dropped oldest"));
                    }
                    OverflowPolicy::Dlq => {
                        let moved = inner
                            .queues
                            .get_mut(queue)
                            .and_then(VecDeque::pop_front);
                        if let Some(moved) = moved {
                            let dlq = keys::dlq_name(queue);
                            inner.queues.entry(dlq).or_default().push_back(moved);
                            result.moved_to_dlq_count = 1;
                            result.warning =
                                Some(format!("queue {queue} full, moved oldest to DLQ"));
                        }
                    }
                }
            }

            let q = inner.queues.entry(queue.to_string()).or_default();
            q.push_back(item.to_string());
            result.success = true;
            result.queue_length = q.len() as u64;
        }
        self.queue_notify.notify_waiters();
        Ok(result)
    }

    async fn pop_queue(&self, queue: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.check_available()?;
            if let Some(item) = self
                .inner
                .lock()
                .queues
                .get_mut(queue)
                .and_then(VecDeque::pop_front)
            {
                return Ok(Some(item));
            }
            let notified = self.queue_notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn queue_len(&self, queue: &str) -> Result<u64> {
        self.check_available()?;
        Ok(self
            .inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.len() as u64)
            .unwrap_or(0))
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        self.check_available()?;
        self.published
            .lock()
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_current_batch_pattern() {
        assert!(glob_match("batch:*:current", "batch:front_door:current"));
        assert!(!glob_match("batch:*:current", "batch:x:started_at"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "other"));
    }

    #[tokio::test]
    async fn set_if_absent_wins_only_once() {
        let kv = MemoryKv::default();
        assert!(kv.set_if_absent("k", "a").await.unwrap());
        assert!(!kv.set_if_absent("k", "b").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn queue_overflow_moves_oldest_to_dlq() {
        let kv = MemoryKv::new(2);
        kv.push_queue("q", "1", OverflowPolicy::Dlq).await.unwrap();
        kv.push_queue("q", "2", OverflowPolicy::Dlq).await.unwrap();
        let result = kv.push_queue("q", "3", OverflowPolicy::Dlq).await.unwrap();
        assert!(result.success);
        assert_eq!(result.moved_to_dlq_count, 1);
        assert_eq!(kv.queue_contents("q"), vec!["2", "3"]);
        assert_eq!(kv.queue_contents("dlq:q"), vec!["1"]);
    }

    #[tokio::test]
    async fn queue_overflow_reject_fails_the_push() {
        let kv = MemoryKv::new(1);
        kv.push_queue("q", "1", OverflowPolicy::Reject).await.unwrap();
        let result = kv.push_queue("q", "2", OverflowPolicy::Reject).await.unwrap();
        assert!(!result.success);
        assert_eq!(kv.queue_contents("q"), vec!["1"]);
    }

    #[tokio::test]
    async fn pop_queue_times_out_when_empty() {
        let kv = MemoryKv::default();
        let popped = kv
            .pop_queue("empty", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(popped.is_none());
    }
}
