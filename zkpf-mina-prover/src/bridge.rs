//! Single-use bridge from a success/failure callback pair to one awaitable value.
//!
//! [`completion_bridge`] returns a [`Completer`], handed to the code that
//! drives the work, and a [`PendingCompletion`], awaited by the caller. The
//! first call to [`Completer::on_success`] or [`Completer::on_failure`]
//! delivers the outcome; later calls are rejected with
//! [`BridgeError::AlreadyCompleted`] and have no effect on what the caller
//! receives. If every `Completer` is dropped without firing, the caller sees
//! [`BridgeError::Abandoned`].
//!
//! The caller can also give up. [`PendingCompletion::wait_within`] signals
//! cancellation when its deadline passes and returns only once every
//! `Completer` has been dropped, so the work behind the bridge has stopped by
//! the time the caller moves on. Dropping the `PendingCompletion` signals
//! cancellation as well. Producers observe it through
//! [`Completer::cancelled`].

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::{oneshot, watch};
use tracing::warn;

use crate::error::BridgeError;

/// Tagged outcome delivered through a bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion<T, E> {
    Success(T),
    Failure(E),
}

impl<T, E> Completion<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Success(_))
    }
}

/// Create a fresh bridge.
pub fn completion_bridge<T, E>() -> (Completer<T, E>, PendingCompletion<T, E>) {
    let (tx, rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = watch::channel(());
    (
        Completer {
            slot: Arc::new(Mutex::new(Some(tx))),
            cancel: cancel_rx,
        },
        PendingCompletion {
            rx,
            cancel: cancel_tx,
        },
    )
}

/// Producer side. Clones share the same write-once slot.
pub struct Completer<T, E> {
    slot: Arc<Mutex<Option<oneshot::Sender<Completion<T, E>>>>>,
    cancel: watch::Receiver<()>,
}

impl<T, E> Clone for Completer<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Completer<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T, E> Completer<T, E> {
    pub fn on_success(&self, value: T) -> Result<(), BridgeError> {
        self.complete(Completion::Success(value))
    }

    pub fn on_failure(&self, error: E) -> Result<(), BridgeError> {
        self.complete(Completion::Failure(error))
    }

    /// Whether an outcome has already been written.
    pub fn is_completed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Resolves once the caller has stopped waiting, either because its
    /// deadline passed or because it was dropped. Work still running for this
    /// bridge should stop and drop its completers.
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        // Ok on an explicit cancel, Err once the caller is gone.
        let _ = cancel.changed().await;
    }

    fn complete(&self, outcome: Completion<T, E>) -> Result<(), BridgeError> {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(sender) => sender
                .send(outcome)
                .map_err(|_| BridgeError::ReceiverDropped),
            None => {
                warn!(
                    success = outcome.is_success(),
                    "completion fired more than once, ignoring"
                );
                Err(BridgeError::AlreadyCompleted)
            }
        }
    }
}

/// Consumer side; awaited exactly once.
#[derive(Debug)]
pub struct PendingCompletion<T, E> {
    rx: oneshot::Receiver<Completion<T, E>>,
    cancel: watch::Sender<()>,
}

impl<T, E> PendingCompletion<T, E> {
    pub async fn wait(self) -> Result<Completion<T, E>, BridgeError> {
        self.rx.await.map_err(|_| BridgeError::Abandoned)
    }

    /// Like [`PendingCompletion::wait`], but gives up after `limit`.
    ///
    /// On timeout the producer is told to cancel, and this returns
    /// [`BridgeError::TimedOut`] only after every completer has been dropped.
    /// A producer that ignores [`Completer::cancelled`] therefore keeps this
    /// future pending.
    pub async fn wait_within(mut self, limit: Duration) -> Result<Completion<T, E>, BridgeError> {
        match tokio::time::timeout(limit, &mut self.rx).await {
            Ok(delivered) => delivered.map_err(|_| BridgeError::Abandoned),
            Err(_) => {
                // Fails only when every completer is already gone.
                let _ = self.cancel.send(());
                self.cancel.closed().await;
                warn!(limit_ms = limit.as_millis() as u64, "completion timed out, producer released");
                Err(BridgeError::TimedOut(limit))
            }
        }
    }
}
