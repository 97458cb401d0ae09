//! Snapshot coordinator.
//!
//! Every snapshot request (timer, key listener, API) and every shutdown
//! signal arrives as a `Command` on one inbox. The coordinator is the only
//! owner of the render session and handles commands one at a time, so two
//! snapshots can never print over each other or over the live table.
//!
//! Requests that pile up while a snapshot is being handled are coalesced:
//! a snapshot only ever shows the latest event, so a second one printed
//! right after the first would be identical.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::capture::{GcTimeAccumulator, HeapSnapshot, LastEventSlot};
use crate::console::Console;
use crate::session::LiveRenderSession;
use crate::source::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotTrigger {
    Timer,
    Key,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserRequested,
    Interrupted,
    SourceEnded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// The panel for GC `gc` was printed.
    Printed { gc: u64 },
    /// Nothing had been captured yet; the "no stats" notice was printed.
    NoData,
    /// Timer request while nothing had been captured; the table was left alone.
    Skipped,
    /// Rendering failed or panicked. The table was still resumed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub status: SnapshotStatus,
    /// The request was answered by a snapshot started for another request.
    pub coalesced: bool,
    /// Render session generation live after the snapshot.
    pub generation: u64,
}

#[derive(Debug)]
pub enum Command {
    Snapshot {
        trigger: SnapshotTrigger,
        reply: Option<oneshot::Sender<SnapshotOutcome>>,
    },
    Shutdown {
        reason: StopReason,
    },
    SourceEnded(Result<(), SourceError>),
}

/// Why `serve` returned.
#[derive(Debug)]
pub enum Ending {
    Stop(StopReason),
    SourceEnded(Result<(), SourceError>),
    /// Every sender is gone.
    Closed,
}

/// Cloneable sender side of the coordinator inbox.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Returns false once the coordinator has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Fire-and-forget snapshot request.
    pub fn request_snapshot(&self, trigger: SnapshotTrigger) -> bool {
        self.send(Command::Snapshot {
            trigger,
            reply: None,
        })
    }

    /// Requests a snapshot and waits until it has been handled.
    ///
    /// `None` if the coordinator stopped before getting to it.
    pub async fn snapshot(&self, trigger: SnapshotTrigger) -> Option<SnapshotOutcome> {
        let (reply, rx) = oneshot::channel();
        if !self.send(Command::Snapshot {
            trigger,
            reply: Some(reply),
        }) {
            return None;
        }
        rx.await.ok()
    }

    pub fn request_shutdown(&self, reason: StopReason) -> bool {
        self.send(Command::Shutdown { reason })
    }
}

pub fn inbox() -> (CoordinatorHandle, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CoordinatorHandle { tx }, rx)
}

pub struct SnapshotCoordinator {
    session: LiveRenderSession,
    console: Arc<dyn Console>,
    slot: Arc<LastEventSlot>,
    totals: Arc<GcTimeAccumulator>,
    snapshots: u64,
}

impl SnapshotCoordinator {
    pub fn new(
        session: LiveRenderSession,
        console: Arc<dyn Console>,
        slot: Arc<LastEventSlot>,
        totals: Arc<GcTimeAccumulator>,
    ) -> Self {
        Self {
            session,
            console,
            slot,
            totals,
            snapshots: 0,
        }
    }

    pub fn session(&self) -> &LiveRenderSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut LiveRenderSession {
        &mut self.session
    }

    /// Snapshots printed so far, "no stats" notices included.
    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    /// Handles commands until a shutdown or the end of the source.
    pub async fn serve(&mut self, inbox: &mut mpsc::UnboundedReceiver<Command>) -> Ending {
        let mut pending: Option<Command> = None;
        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => match inbox.recv().await {
                    Some(command) => command,
                    None => return Ending::Closed,
                },
            };

            match command {
                Command::Snapshot { trigger, reply } => {
                    let mut batch = SnapshotBatch::new(trigger, reply);
                    pending = batch.absorb(inbox);
                    let status = self.snapshot_once(batch.trigger).await;
                    pending = self.settle_batch(batch, status, pending, inbox);
                }
                Command::Shutdown { reason } => {
                    tracing::info!(?reason, "shutdown requested");
                    return Ending::Stop(reason);
                }
                Command::SourceEnded(result) => return Ending::SourceEnded(result),
            }
        }
    }

    /// Answers a handled batch. Requests that arrived while printing see
    /// the same panel. A skipped timer run printed nothing, so those stay
    /// queued and get a run of their own.
    fn settle_batch(
        &self,
        mut batch: SnapshotBatch,
        status: SnapshotStatus,
        pending: Option<Command>,
        inbox: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Option<Command> {
        let pending = match pending {
            None if status != SnapshotStatus::Skipped => batch.absorb(inbox),
            other => other,
        };
        batch.answer(status, self.session.generation());
        pending
    }

    /// Takes the terminal from the live table, prints one snapshot and
    /// hands the terminal back. The table is resumed whatever happens
    /// while printing.
    pub async fn snapshot_once(&mut self, trigger: SnapshotTrigger) -> SnapshotStatus {
        if trigger == SnapshotTrigger::Timer && self.slot.is_empty() {
            tracing::debug!("timer snapshot skipped, nothing captured yet");
            return SnapshotStatus::Skipped;
        }

        self.session.stop().await;

        let snapshot = self
            .slot
            .get()
            .map(|captured| HeapSnapshot::from_captured(&captured, self.totals.totals()));
        let console = Arc::clone(&self.console);
        let printed = panic::catch_unwind(AssertUnwindSafe(|| {
            console.write_snapshot(snapshot.as_ref())
        }));
        let status = match printed {
            Ok(Ok(())) => {
                self.snapshots += 1;
                snapshot.map_or(SnapshotStatus::NoData, |s| SnapshotStatus::Printed {
                    gc: s.number,
                })
            }
            Ok(Err(err)) => {
                tracing::warn!(%err, "failed to print snapshot");
                SnapshotStatus::Failed
            }
            Err(_) => {
                tracing::warn!("snapshot renderer panicked");
                SnapshotStatus::Failed
            }
        };

        let generation = self.session.restart().await;
        tracing::info!(?trigger, ?status, generation, "snapshot handled");
        status
    }
}

/// Snapshot requests answered by a single print.
struct SnapshotBatch {
    trigger: SnapshotTrigger,
    replies: Vec<Option<oneshot::Sender<SnapshotOutcome>>>,
}

impl SnapshotBatch {
    fn new(trigger: SnapshotTrigger, reply: Option<oneshot::Sender<SnapshotOutcome>>) -> Self {
        Self {
            trigger,
            replies: vec![reply],
        }
    }

    /// Pulls queued snapshot requests into the batch. Stops at the first
    /// other command and returns it so command order is kept.
    fn absorb(&mut self, inbox: &mut mpsc::UnboundedReceiver<Command>) -> Option<Command> {
        while let Ok(command) = inbox.try_recv() {
            match command {
                Command::Snapshot { trigger, reply } => {
                    // A user request is never skipped for lack of data.
                    if trigger != SnapshotTrigger::Timer {
                        self.trigger = trigger;
                    }
                    self.replies.push(reply);
                }
                other => return Some(other),
            }
        }
        None
    }

    fn answer(self, status: SnapshotStatus, generation: u64) {
        if self.replies.len() > 1 {
            tracing::debug!(requests = self.replies.len(), "snapshot requests coalesced");
        }
        for (i, reply) in self.replies.into_iter().enumerate() {
            if let Some(reply) = reply {
                let _ = reply.send(SnapshotOutcome {
                    status,
                    coalesced: i > 0,
                    generation,
                });
            }
        }
    }
}
