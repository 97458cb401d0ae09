//! Unbounded FIFO carrying formatted rows from ingestion to the renderer.
//!
//! Any number of `RowSender`s may enqueue; at most one `RowConsumer`
//! exists at a time. The receiver outlives every consumer, so rows left
//! behind by a stopped consumer are picked up by the next one.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;

use crate::columns::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DequeueError {
    /// The consumer's cancellation token fired.
    #[error("dequeue canceled")]
    Canceled,
    /// Every sender is gone and the queue is drained.
    #[error("row queue closed")]
    Closed,
}

/// Producer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RowSender {
    tx: mpsc::UnboundedSender<Row>,
}

impl RowSender {
    /// Never blocks. Returns `false` only when the queue itself is gone.
    pub fn enqueue(&self, row: Row) -> bool {
        if self.tx.send(row).is_err() {
            tracing::debug!("row queue dropped, row discarded");
            return false;
        }
        true
    }
}

/// Consumer side, shared by successive render sessions.
#[derive(Debug, Clone)]
pub struct RowQueue {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Row>>>,
}

impl RowQueue {
    pub fn channel() -> (RowSender, RowQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RowSender { tx },
            RowQueue {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Waits until no other consumer holds the queue, then takes it.
    pub async fn consumer(&self) -> RowConsumer {
        RowConsumer {
            rx: Arc::clone(&self.rx).lock_owned().await,
        }
    }

    /// Takes every queued row without waiting.
    #[cfg(test)]
    pub(crate) fn drain_now(&self) -> Vec<Row> {
        let mut rx = self.rx.try_lock().expect("queue held by a consumer");
        let mut rows = Vec::new();
        while let Ok(row) = rx.try_recv() {
            rows.push(row);
        }
        rows
    }

    /// Rows currently waiting. Zero while a consumer holds the queue.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.rx.try_lock().map_or(0, |rx| rx.len())
    }
}

/// Exclusive reading handle; dropping it hands the queue back.
#[derive(Debug)]
pub struct RowConsumer {
    rx: OwnedMutexGuard<mpsc::UnboundedReceiver<Row>>,
}

impl RowConsumer {
    /// Next row in arrival order.
    ///
    /// Cancellation wins over ready data, so a canceled consumer never
    /// takes a row it would not render.
    ///
    /// # Errors
    /// `Canceled` once `cancel` fires, `Closed` once all senders are gone
    /// and nothing is left.
    pub async fn dequeue(&mut self, cancel: &CancellationToken) -> Result<Row, DequeueError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DequeueError::Canceled),
            row = self.rx.recv() => row.ok_or(DequeueError::Closed),
        }
    }
}
