//! Per-key write serialization.
//!
//! The [`Locker`] lets at most one unit of work run per key. Waiting is
//! bounded by the caller's budget; work on different keys never blocks.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::telemetry::{self, QueueOutcome};

/// The lock for a key could not be acquired within the wait budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("lock not acquired")]
pub struct LockNotAcquired;

struct Slot {
    semaphore: Arc<Semaphore>,
    // Permit taken through `acquire_lock`, returned by `release_lock`
    held: Option<OwnedSemaphorePermit>,
}

impl Slot {
    fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            held: None,
        }
    }
}

/// Per-key single-slot lock with queue metrics.
///
/// Waiters on one key are served in arrival order. Slots are created on first
/// use and kept for the lifetime of the locker.
pub struct Locker {
    slots: DashMap<String, Slot>,
    queue_name: String,
}

impl Default for Locker {
    fn default() -> Self {
        Self::new("default")
    }
}

impl Locker {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            slots: DashMap::new(),
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(Slot::new)
            .semaphore
            .clone()
    }

    async fn acquire_permit(
        &self,
        key: &str,
        wait: Duration,
    ) -> Result<OwnedSemaphorePermit, LockNotAcquired> {
        let semaphore = self.semaphore(key);
        let start = Instant::now();
        match tokio::time::timeout(wait, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => {
                self.observe(QueueOutcome::Acquired, start);
                Ok(permit)
            }
            _ => {
                self.observe(QueueOutcome::Cancelled, start);
                debug!("Lock for {} not acquired within {:?}", key, wait);
                Err(LockNotAcquired)
            }
        }
    }

    fn try_acquire_permit(&self, key: &str) -> Result<OwnedSemaphorePermit, LockNotAcquired> {
        let start = Instant::now();
        match self.semaphore(key).try_acquire_owned() {
            Ok(permit) => {
                self.observe(QueueOutcome::Acquired, start);
                Ok(permit)
            }
            Err(_) => {
                self.observe(QueueOutcome::Cancelled, start);
                Err(LockNotAcquired)
            }
        }
    }

    fn hold(&self, key: &str, permit: OwnedSemaphorePermit) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.held = Some(permit);
        }
    }

    fn observe(&self, outcome: QueueOutcome, start: Instant) {
        telemetry::record_time_in_queue(&self.queue_name, outcome, start.elapsed().as_secs_f64());
    }

    /// Block until the lock for `key` is free or `wait` has elapsed.
    ///
    /// The lock stays held until [`Locker::release_lock`] is called.
    pub async fn acquire_lock(&self, key: &str, wait: Duration) -> Result<(), LockNotAcquired> {
        let permit = self.acquire_permit(key, wait).await?;
        self.hold(key, permit);
        Ok(())
    }

    /// Take the lock for `key` only if it is free right now.
    pub fn try_acquire_lock(&self, key: &str) -> Result<(), LockNotAcquired> {
        let permit = self.try_acquire_permit(key)?;
        self.hold(key, permit);
        Ok(())
    }

    /// Release a lock taken with `acquire_lock` or `try_acquire_lock`.
    ///
    /// Releasing a key that is not held, or was never seen, does nothing.
    pub fn release_lock(&self, key: &str) {
        let permit = self
            .slots
            .get_mut(key)
            .and_then(|mut slot| slot.held.take());
        drop(permit);
    }

    /// Run `run` with exclusive access to `key`.
    ///
    /// Fails with the lock error only if the lock could not be acquired within
    /// `wait`; otherwise returns whatever `run` returns. The lock is released
    /// when `run` finishes, fails, or is dropped.
    pub async fn run_b<F, Fut, T, E>(&self, key: &str, wait: Duration, run: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockNotAcquired>,
    {
        let _queued = QueueGuard::enter(&self.queue_name);
        let _permit = self.acquire_permit(key, wait).await?;
        run().await
    }
}

/// Keeps the queue-length gauge balanced even if the caller is dropped.
struct QueueGuard<'a> {
    queue: &'a str,
}

impl<'a> QueueGuard<'a> {
    fn enter(queue: &'a str) -> Self {
        telemetry::queue_entered(queue);
        Self { queue }
    }
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        telemetry::queue_left(self.queue);
    }
}
