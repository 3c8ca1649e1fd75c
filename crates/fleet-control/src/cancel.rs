//! Cooperative cancellation for fleet runs.
//!
//! A run checks its `CancelSignal` before dispatching each remote
//! operation, including retries. In-flight calls are never aborted.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};

/// Report detail for operations not dispatched because the run was cancelled.
pub const CANCELLED: &str = "cancelled";

/// Trigger side, held by whoever may cancel the run (e.g. a Ctrl-C handler).
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side, cloned into every task of a run.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. Pends forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Wait for a permit unless the run is cancelled first.
    pub async fn acquire(&mut self, permits: &Arc<Semaphore>) -> Option<OwnedSemaphorePermit> {
        if self.is_cancelled() {
            return None;
        }
        let permit = tokio::select! {
            biased;
            _ = self.cancelled() => None,
            permit = permits.clone().acquire_owned() => permit.ok(),
        };
        permit.filter(|_| !self.is_cancelled())
    }
}
