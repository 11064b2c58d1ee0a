//! Process-wide mutual exclusion.
//!
//! Backed by [`tokio::sync::Mutex`], which hands the lock out in FIFO order,
//! so a waiter cannot be starved. The guard is dropped on every exit path of
//! the action (return, `?`, panic, or the whole future being dropped), so the
//! gate never leaks.
//!
//! The gate is not re-entrant: calling [`ExclusiveGate::run_exclusive`] from
//! inside an action running on the same gate deadlocks.

use std::{future::Future, time::Instant};

use tokio::sync::Mutex;
use tracing::debug;

/// A single exclusive section shared by every request in the process.
#[derive(Debug, Default)]
pub struct ExclusiveGate {
    lock: Mutex<()>,
}

impl ExclusiveGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` while no other action on this gate is running.
    pub async fn run_exclusive<F, Fut, T>(&self, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let waited = Instant::now();
        let _guard = self.lock.lock().await;
        debug!(wait_ms = waited.elapsed().as_millis() as u64, "gate acquired");
        action().await
    }

    /// Whether some action currently holds the gate.
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
