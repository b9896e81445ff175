//! Shared AI inference concurrency gate
//!
//! One process-wide semaphore bounds concurrent AI inferences across the
//! detector client and the LLM analyzer, keeping total GPU load predictable.
//! Permits are reducible under memory pressure and restored when the GPU
//! returns to normal.

use crate::gpu::MemoryPressureLevel;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// RAII permit for one in-flight inference
///
/// The permit returns to the pool when dropped, which covers every exit
/// path: success, error, and cancellation.
#[derive(Debug)]
pub struct InferencePermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Default)]
struct ReductionState {
    /// Permits currently withheld due to memory pressure
    reduced_by: usize,
}

/// Bounded-concurrency gate shared by all AI calls
#[derive(Debug)]
pub struct InferenceSemaphore {
    inner: Arc<Semaphore>,
    total_permits: usize,
    state: Mutex<ReductionState>,
}

impl InferenceSemaphore {
    /// Create a semaphore with the configured permit count
    pub fn new(max_concurrent: usize) -> Self {
        let total_permits = max_concurrent.max(1);
        info!(max_concurrent = total_permits, "inference semaphore initialized");
        Self {
            inner: Arc::new(Semaphore::new(total_permits)),
            total_permits,
            state: Mutex::new(ReductionState::default()),
        }
    }

    /// Acquire one inference permit, waiting if the pool is exhausted
    pub async fn acquire(&self) -> InferencePermit {
        // The semaphore is never closed, so acquire_owned cannot fail
        let permit = Arc::clone(&self.inner)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("inference semaphore is never closed"));
        InferencePermit { _permit: permit }
    }

    /// Permits configured before any pressure reduction
    pub fn total_permits(&self) -> usize {
        self.total_permits
    }

    /// Permits currently available for acquisition
    pub fn available_permits(&self) -> usize {
        self.inner.available_permits()
    }

    /// Permits withheld by the current pressure reduction
    pub fn reduced_permits(&self) -> usize {
        self.state.lock().reduced_by
    }

    fn target_reduction(&self, level: MemoryPressureLevel) -> usize {
        match level {
            MemoryPressureLevel::Normal => 0,
            // ~25% fewer permits, leaving at least one
            MemoryPressureLevel::Warning => {
                (self.total_permits / 4).max(1).min(self.total_permits - 1)
            }
            // Halve the pool, leaving at least one
            MemoryPressureLevel::Critical => {
                self.total_permits - (self.total_permits / 2).max(1)
            }
        }
    }

    /// Throttle the pool for the given pressure level
    ///
    /// Idempotent: repeated calls at the same level change nothing. The
    /// reduction amount is tracked so it can be undone exactly.
    pub fn reduce_permits_for_memory_pressure(&self, level: MemoryPressureLevel) {
        let target = self.target_reduction(level);
        let mut state = self.state.lock();
        if state.reduced_by == target {
            return;
        }
        if target > state.reduced_by {
            let want = target - state.reduced_by;
            // forget_permits only removes currently-available permits;
            // in-flight inferences keep theirs until release
            let forgotten = self.inner.forget_permits(want);
            state.reduced_by += forgotten;
            warn!(
                level = %level,
                reduced_by = state.reduced_by,
                total = self.total_permits,
                "reduced inference permits under memory pressure"
            );
        } else {
            let give_back = state.reduced_by - target;
            self.inner.add_permits(give_back);
            state.reduced_by = target;
            debug!(
                level = %level,
                reduced_by = state.reduced_by,
                "eased inference permit reduction"
            );
        }
    }

    /// Restore the original permit count after pressure clears
    ///
    /// Safe to call repeatedly; a no-op when nothing is withheld.
    pub fn restore_permits_after_pressure(&self) {
        let mut state = self.state.lock();
        if state.reduced_by == 0 {
            return;
        }
        self.inner.add_permits(state.reduced_by);
        info!(restored = state.reduced_by, "restored inference permits");
        state.reduced_by = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn limits_concurrent_operations() {
        let semaphore = Arc::new(InferenceSemaphore::new(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let semaphore = Arc::clone(&semaphore);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn permit_released_on_drop() {
        let semaphore = InferenceSemaphore::new(1);
        {
            let _permit = semaphore.acquire().await;
            assert_eq!(semaphore.available_permits(), 0);
        }
        assert_eq!(semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn warning_reduces_about_a_quarter() {
        let semaphore = InferenceSemaphore::new(4);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Warning);
        assert_eq!(semaphore.available_permits(), 3);
        assert_eq!(semaphore.reduced_permits(), 1);
    }

    #[tokio::test]
    async fn critical_halves_the_pool() {
        let semaphore = InferenceSemaphore::new(4);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Critical);
        assert_eq!(semaphore.available_permits(), 2);
        assert_eq!(semaphore.reduced_permits(), 2);
    }

    #[tokio::test]
    async fn reduction_keeps_at_least_one_permit() {
        let semaphore = InferenceSemaphore::new(1);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Critical);
        assert_eq!(semaphore.available_permits(), 1);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Warning);
        assert_eq!(semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn reduction_is_idempotent() {
        let semaphore = InferenceSemaphore::new(4);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Critical);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Critical);
        assert_eq!(semaphore.reduced_permits(), 2);
        assert_eq!(semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn warning_after_critical_eases_the_reduction() {
        let semaphore = InferenceSemaphore::new(4);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Critical);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Warning);
        assert_eq!(semaphore.reduced_permits(), 1);
        assert_eq!(semaphore.available_permits(), 3);
    }

    #[tokio::test]
    async fn restore_is_repeat_safe() {
        let semaphore = InferenceSemaphore::new(4);
        semaphore.reduce_permits_for_memory_pressure(MemoryPressureLevel::Critical);
        semaphore.restore_permits_after_pressure();
        semaphore.restore_permits_after_pressure();
        assert_eq!(semaphore.available_permits(), 4);
        assert_eq!(semaphore.reduced_permits(), 0);
    }
}
