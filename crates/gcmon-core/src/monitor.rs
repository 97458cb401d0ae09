//! The monitor facade: wires a trace source, the ingestion path, the live
//! table and the snapshot coordinator together and runs them until the
//! user quits or the source ends.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::capture::{GcTimeAccumulator, LastEventSlot};
use crate::columns::ColumnRegistry;
use crate::config::{ConfigError, Configuration};
use crate::console::Console;
use crate::coordinator::{
    self, Command, CoordinatorHandle, Ending, SnapshotCoordinator, SnapshotOutcome,
    SnapshotTrigger,
};
pub use crate::coordinator::StopReason;
use crate::filter::EventFilter;
use crate::ingest::{GcIngest, IngestStats};
use crate::interrupt;
use crate::keyboard::{KeyAction, KeyListener};
use crate::queue::RowQueue;
use crate::session::{LiveRenderSession, SessionError};
use crate::source::{SourceError, Subscription, TargetProcess, TraceSource};

pub const DISCONNECTED_NOTICE: &str = "Trace source disconnected.";

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start the {what}")]
    Spawn {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to the terminal")]
    Console(#[source] io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("trace source failed")]
    Source(#[source] SourceError),

    #[error("monitor has already run")]
    AlreadyRan,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    /// Run the key listener. The caller puts the terminal in raw mode.
    pub keys: bool,
    /// Turn Ctrl+C into a clean shutdown.
    pub watch_interrupt: bool,
    /// Replaces the configured stats timer.
    pub stats_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub stop: StopReason,
    pub seen: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub placeholder_cells: u64,
    pub snapshots: u64,
    pub render_sessions: u64,
}

/// Cloneable remote control for a monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    inner: CoordinatorHandle,
}

impl MonitorHandle {
    pub fn request_snapshot(&self) -> bool {
        self.inner.request_snapshot(SnapshotTrigger::Api)
    }

    /// Waits for the snapshot to be printed.
    pub async fn snapshot(&self) -> Option<SnapshotOutcome> {
        self.inner.snapshot(SnapshotTrigger::Api).await
    }

    pub fn request_shutdown(&self) -> bool {
        self.inner.request_shutdown(StopReason::UserRequested)
    }
}

#[derive(Default)]
struct Helpers {
    subscription: Option<Subscription>,
    keys: Option<KeyListener>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Monitor {
    source: Option<Box<dyn TraceSource>>,
    ingest: Option<GcIngest>,
    coordinator: SnapshotCoordinator,
    console: Arc<dyn Console>,
    stats: Arc<IngestStats>,
    handle: CoordinatorHandle,
    inbox: mpsc::UnboundedReceiver<Command>,
    stats_interval: Option<Duration>,
    keys: bool,
    watch_interrupt: bool,
    helpers: Helpers,
}

impl Monitor {
    /// Validates the configuration and builds every component. Nothing is
    /// printed and no thread is started yet.
    ///
    /// # Errors
    /// Returns a configuration error, typically an unknown column.
    pub fn initialize<S: TraceSource>(
        config: &Configuration,
        source: S,
        console: Arc<dyn Console>,
        options: MonitorOptions,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let columns = ColumnRegistry::builtin()
            .resolve(config.columns.as_slice())
            .map_err(ConfigError::from)?;
        let filter = EventFilter::new(config.min_gc_duration_msec()?);
        let stats_interval = match options.stats_interval {
            Some(period) if period.is_zero() => {
                return Err(ConfigError::InvalidTimer(format!("{period:?}")).into());
            }
            Some(period) => Some(period),
            None => config.stats_interval()?,
        };
        tracing::info!(
            columns = columns.len(),
            min_pause = ?filter.min_pause_msec(),
            ?stats_interval,
            keys = options.keys,
            "monitor initialized"
        );

        let (rows, queue) = RowQueue::channel();
        let slot = Arc::new(LastEventSlot::new());
        let totals = Arc::new(GcTimeAccumulator::new());
        let stats = Arc::new(IngestStats::default());
        let session = LiveRenderSession::new(queue, Arc::clone(&console), columns.layout());
        let ingest = GcIngest::new(
            filter,
            columns,
            Arc::clone(&slot),
            Arc::clone(&totals),
            rows,
            Arc::clone(&stats),
        );
        let coordinator = SnapshotCoordinator::new(session, Arc::clone(&console), slot, totals);
        let (handle, inbox) = coordinator::inbox();

        Ok(Self {
            source: Some(Box::new(source)),
            ingest: Some(ingest),
            coordinator,
            console,
            stats,
            handle,
            inbox,
            stats_interval,
            keys: options.keys,
            watch_interrupt: options.watch_interrupt,
            helpers: Helpers::default(),
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            inner: self.handle.clone(),
        }
    }

    /// Monitors until a shutdown request, an interrupt or the end of the
    /// source.
    ///
    /// When the source ends cleanly the rows still queued are rendered
    /// before returning. Other stops leave them unrendered.
    ///
    /// # Errors
    /// Returns an error if a helper cannot start, the terminal cannot be
    /// written, or the source fails.
    pub async fn run_until_stopped(&mut self) -> Result<RunSummary, MonitorError> {
        let (Some(source), Some(ingest)) = (self.source.take(), self.ingest.take()) else {
            return Err(MonitorError::AlreadyRan);
        };

        let result = self.run(source, ingest).await;
        self.shutdown();
        let stop = result?;
        let summary = self.summary(stop);
        tracing::info!(?summary, "monitor stopped");
        Ok(summary)
    }

    async fn run(
        &mut self,
        source: Box<dyn TraceSource>,
        ingest: GcIngest,
    ) -> Result<StopReason, MonitorError> {
        self.write_banner(&source.target())?;

        let on_end = self.handle.clone();
        let subscription = Subscription::spawn(source, ingest, move |result| {
            on_end.send(Command::SourceEnded(result));
        })
        .map_err(|source| MonitorError::Spawn {
            what: "trace source",
            source,
        })?;
        self.helpers.subscription = Some(subscription);
        self.start_helpers()?;

        self.coordinator.session_mut().start()?;
        let ending = self.coordinator.serve(&mut self.inbox).await;
        self.stop_helpers().await;

        match ending {
            Ending::Stop(reason) => {
                self.coordinator.session_mut().stop().await;
                Ok(reason)
            }
            Ending::Closed => {
                self.coordinator.session_mut().stop().await;
                Ok(StopReason::UserRequested)
            }
            Ending::SourceEnded(result) => {
                // The source dropped its row sender before reporting, so
                // this returns once the backlog is on screen.
                self.coordinator.session_mut().finish().await;
                match result {
                    Ok(()) => {
                        self.console
                            .write_notice(DISCONNECTED_NOTICE)
                            .map_err(MonitorError::Console)?;
                        Ok(StopReason::SourceEnded)
                    }
                    Err(err) => {
                        let _ = self
                            .console
                            .write_warning(&format!("Trace source failed: {err}"));
                        Err(MonitorError::Source(err))
                    }
                }
            }
        }
    }

    fn write_banner(&self, target: &TargetProcess) -> Result<(), MonitorError> {
        self.console
            .write_process_info(target)
            .and_then(|()| self.console.write_usage(self.keys))
            .map_err(MonitorError::Console)
    }

    fn start_helpers(&mut self) -> Result<(), MonitorError> {
        if let Some(period) = self.stats_interval {
            self.helpers
                .tasks
                .push(spawn_timer(period, self.handle.clone()));
        }

        if self.watch_interrupt {
            let handle = self.handle.clone();
            self.helpers.tasks.push(tokio::spawn(async move {
                interrupt::wait_for_interrupt().await;
                handle.request_shutdown(StopReason::Interrupted);
            }));
        }

        if self.keys {
            let handle = self.handle.clone();
            let listener = KeyListener::spawn(move |action| match action {
                KeyAction::Snapshot => {
                    handle.request_snapshot(SnapshotTrigger::Key);
                }
                KeyAction::Shutdown => {
                    handle.request_shutdown(StopReason::UserRequested);
                }
                KeyAction::Interrupt => {
                    interrupt::trigger_ctrl_c();
                    handle.request_shutdown(StopReason::Interrupted);
                }
            })
            .map_err(|source| MonitorError::Spawn {
                what: "key listener",
                source,
            })?;
            self.helpers.keys = Some(listener);
        }
        Ok(())
    }

    /// Stops the helpers and waits for the key listener to let go of the
    /// terminal.
    async fn stop_helpers(&mut self) {
        if let Some(keys) = self.helpers.keys.take() {
            keys.stop().await;
        }
        self.abort_helpers();
    }

    /// Dropping the key listener cancels it without waiting.
    fn abort_helpers(&mut self) {
        self.helpers.keys.take();
        for task in self.helpers.tasks.drain(..) {
            task.abort();
        }
    }

    /// Disposes the trace subscription and stops the timer and listeners.
    ///
    /// Idempotent. The live table is left as is; `run_until_stopped` stops
    /// it before returning.
    pub fn shutdown(&mut self) {
        self.abort_helpers();
        if let Some(subscription) = self.helpers.subscription.take() {
            subscription.dispose();
        }
    }

    fn summary(&self, stop: StopReason) -> RunSummary {
        RunSummary {
            stop,
            seen: self.stats.seen(),
            accepted: self.stats.accepted(),
            rejected: self.stats.rejected(),
            placeholder_cells: self.stats.placeholder_cells(),
            snapshots: self.coordinator.snapshots(),
            render_sessions: self.coordinator.session().generation(),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_timer(period: Duration, handle: CoordinatorHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if !handle.request_snapshot(SnapshotTrigger::Timer) {
                break;
            }
        }
    })
}
