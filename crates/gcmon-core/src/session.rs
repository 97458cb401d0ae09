//! Live table render session.
//!
//! A session owns at most one consumer task draining the `RowQueue` into
//! the console. `stop()` waits for that task to finish, so once it
//! returns nothing else is writing to the terminal and the caller may
//! print freely until `restart()`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::columns::TableLayout;
use crate::console::Console;
use crate::queue::{DequeueError, RowQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("render session {0} is already live")]
    AlreadyLive(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Live { generation: u64 },
}

/// Why a consumer task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// Stopped by the session.
    Canceled,
    /// The queue closed and every row was rendered.
    Drained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerReport {
    pub generation: u64,
    pub rows: u64,
    pub exit: ConsumerExit,
}

struct ActiveConsumer {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<ConsumerReport>,
}

pub struct LiveRenderSession {
    queue: RowQueue,
    console: Arc<dyn Console>,
    layout: TableLayout,
    generation: u64,
    active: Option<ActiveConsumer>,
}

impl LiveRenderSession {
    pub fn new(queue: RowQueue, console: Arc<dyn Console>, layout: TableLayout) -> Self {
        Self {
            queue,
            console,
            layout,
            generation: 0,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.active {
            Some(active) => SessionState::Live {
                generation: active.generation,
            },
            None => SessionState::Idle,
        }
    }

    pub fn is_live(&self) -> bool {
        self.active.is_some()
    }

    /// Number of consumers started so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Spawns a consumer for a new generation.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Returns `AlreadyLive` if a consumer is running.
    pub fn start(&mut self) -> Result<u64, SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyLive(active.generation));
        }
        Ok(self.spawn_consumer())
    }

    /// Cancels the running consumer and waits for it to exit.
    ///
    /// No-op when idle. A consumer that panicked is logged and reported as
    /// `None`; rows it did not take stay queued.
    pub async fn stop(&mut self) -> Option<ConsumerReport> {
        let active = self.active.take()?;
        active.cancel.cancel();
        Self::join(active).await
    }

    /// Stops (if live) and starts a fresh consumer on the same queue.
    pub async fn restart(&mut self) -> u64 {
        self.stop().await;
        self.spawn_consumer()
    }

    /// Renders everything left in a closed queue, then goes idle.
    ///
    /// Only returns once every sender is gone; callers use it after the
    /// trace source has ended.
    pub async fn finish(&mut self) -> Option<ConsumerReport> {
        if self.active.is_none() {
            self.spawn_consumer();
        }
        let active = self.active.take()?;
        Self::join(active).await
    }

    fn spawn_consumer(&mut self) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume(
            self.queue.clone(),
            Arc::clone(&self.console),
            self.layout.clone(),
            cancel.clone(),
            generation,
        ));
        tracing::debug!(generation, "render session live");
        self.active = Some(ActiveConsumer {
            generation,
            cancel,
            task,
        });
        generation
    }

    async fn join(active: ActiveConsumer) -> Option<ConsumerReport> {
        match active.task.await {
            Ok(report) => {
                tracing::debug!(
                    generation = report.generation,
                    rows = report.rows,
                    exit = ?report.exit,
                    "render session idle"
                );
                Some(report)
            }
            Err(err) => {
                tracing::warn!(generation = active.generation, %err, "render consumer failed");
                None
            }
        }
    }
}

impl Drop for LiveRenderSession {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

async fn consume(
    queue: RowQueue,
    console: Arc<dyn Console>,
    layout: TableLayout,
    cancel: CancellationToken,
    generation: u64,
) -> ConsumerReport {
    let mut report = ConsumerReport {
        generation,
        rows: 0,
        exit: ConsumerExit::Canceled,
    };

    let mut consumer = tokio::select! {
        biased;
        () = cancel.cancelled() => return report,
        consumer = queue.consumer() => consumer,
    };

    if let Err(err) = console.begin_table(&layout) {
        tracing::warn!(generation, %err, "failed to write table header");
    }

    report.exit = loop {
        match consumer.dequeue(&cancel).await {
            Ok(row) => {
                if let Err(err) = console.write_row(&row) {
                    tracing::warn!(generation, %err, "failed to write row");
                }
                report.rows += 1;
            }
            Err(DequeueError::Canceled) => break ConsumerExit::Canceled,
            Err(DequeueError::Closed) => break ConsumerExit::Drained,
        }
    };

    if let Err(err) = console.end_table() {
        tracing::warn!(generation, %err, "failed to close table");
    }
    report
}

#[cfg(test)]
mod tests {
    use std::ops::Range;
    use std::time::Duration;

    use super::*;
    use crate::columns::{ColumnRegistry, Row};
    use crate::console::memory::MemoryConsole;
    use crate::queue::RowSender;

    fn row(n: u64) -> Row {
        Row {
            generation: 0,
            cells: vec![n.to_string()],
        }
    }

    fn numbers(range: Range<u64>) -> Vec<String> {
        range.map(|n| n.to_string()).collect()
    }

    fn session() -> (LiveRenderSession, RowSender, Arc<MemoryConsole>) {
        let (tx, queue) = RowQueue::channel();
        let console = Arc::new(MemoryConsole::new());
        let layout = ColumnRegistry::builtin().resolve(&["gen"]).unwrap().layout();
        let session =
            LiveRenderSession::new(queue, Arc::clone(&console) as Arc<dyn Console>, layout);
        (session, tx, console)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_lifecycle_bumps_generation() {
        let (mut session, _tx, _console) = session();
        assert_eq!(session.state(), SessionState::Idle);

        assert_eq!(session.start().unwrap(), 1);
        assert_eq!(session.state(), SessionState::Live { generation: 1 });
        assert_eq!(session.start(), Err(SessionError::AlreadyLive(1)));

        let report = session.stop().await.unwrap();
        assert_eq!(report.exit, ConsumerExit::Canceled);
        assert_eq!(session.state(), SessionState::Idle);

        assert_eq!(session.restart().await, 2);
        assert_eq!(session.restart().await, 3);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let (mut session, _tx, console) = session();
        assert!(session.stop().await.is_none());
        assert!(session.stop().await.is_none());
        assert!(console.entries().is_empty());
    }

    #[tokio::test]
    async fn test_rows_render_in_order() {
        let (mut session, tx, console) = session();
        session.start().unwrap();
        for n in 0..50 {
            tx.enqueue(row(n));
        }
        settle().await;
        session.stop().await;

        assert_eq!(console.rendered(), numbers(0..50));
        assert!(console.violations().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_written_after_stop_returns() {
        let (mut session, tx, console) = session();
        session.start().unwrap();
        tx.enqueue(row(1));
        settle().await;
        session.stop().await;

        let before = console.entries().len();
        assert!(!console.table_open());
        for n in 2..10 {
            tx.enqueue(row(n));
        }
        settle().await;
        assert_eq!(console.entries().len(), before);
    }

    #[tokio::test]
    async fn test_stop_restart_loses_no_rows() {
        let (mut session, tx, console) = session();
        session.start().unwrap();
        for n in 0..10 {
            tx.enqueue(row(n));
        }
        session.stop().await;
        for n in 10..20 {
            tx.enqueue(row(n));
        }
        session.restart().await;
        for n in 20..30 {
            tx.enqueue(row(n));
        }
        settle().await;
        session.stop().await;

        assert_eq!(console.rendered(), numbers(0..30));
        assert!(console.violations().is_empty());
    }

    #[tokio::test]
    async fn test_consumer_panic_is_swallowed() {
        let (mut session, tx, console) = session();
        console.panic_rows(true);
        session.start().unwrap();
        tx.enqueue(row(1));
        settle().await;

        assert!(session.stop().await.is_none());
        assert_eq!(session.state(), SessionState::Idle);

        console.panic_rows(false);
        session.restart().await;
        tx.enqueue(row(2));
        settle().await;
        session.stop().await;
        assert_eq!(console.rendered(), vec!["2".to_string()]);
    }

    #[tokio::test]
    async fn test_finish_drains_closed_queue() {
        let (mut session, tx, console) = session();
        session.start().unwrap();
        for n in 0..5 {
            tx.enqueue(row(n));
        }
        drop(tx);

        let report = session.finish().await.unwrap();
        assert_eq!(report.exit, ConsumerExit::Drained);
        assert_eq!(console.rendered(), numbers(0..5));
        assert!(!session.is_live());
    }

    #[tokio::test]
    async fn test_finish_from_idle_starts_a_drain() {
        let (mut session, tx, console) = session();
        tx.enqueue(row(9));
        drop(tx);

        let report = session.finish().await.unwrap();
        assert_eq!(report.rows, 1);
        assert_eq!(console.rendered(), vec!["9".to_string()]);
    }
}
