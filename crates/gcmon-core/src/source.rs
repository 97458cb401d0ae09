//! Trace sources and the subscription that drives them.
//!
//! A `TraceSource` runs a blocking dispatch loop and calls back once per
//! GC completion record. `Subscription` runs that loop on its own thread,
//! feeds the records into a `GcIngest`, and reports how the loop ended.

use std::io::{self, BufRead};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use gcmon_types::{GcEvent, TraceRecord};
use tokio_util::sync::CancellationToken;

use crate::ingest::GcIngest;

/// The process being monitored, as far as it is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetProcess {
    pub pid: Option<u32>,
    pub name: Option<String>,
}

/// How the command line picked the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessSelector {
    Id(u32),
    Name(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read trace feed")]
    Io(#[from] io::Error),
    #[error("trace source panicked")]
    Panicked,
}

pub trait TraceSource: Send + 'static {
    fn target(&self) -> TargetProcess;

    /// Delivers records until the stream ends or `stop` fires.
    ///
    /// # Errors
    /// Returns an error if the underlying stream fails.
    fn process(
        &mut self,
        stop: &CancellationToken,
        on_gc_end: &mut dyn FnMut(GcEvent),
    ) -> Result<(), SourceError>;
}

impl TraceSource for Box<dyn TraceSource> {
    fn target(&self) -> TargetProcess {
        (**self).target()
    }

    fn process(
        &mut self,
        stop: &CancellationToken,
        on_gc_end: &mut dyn FnMut(GcEvent),
    ) -> Result<(), SourceError> {
        (**self).process(stop, on_gc_end)
    }
}

/// Reads newline-delimited `TraceRecord` JSON and keeps the records of one
/// process.
pub struct FeedSource<R> {
    reader: R,
    selector: ProcessSelector,
    locked_pid: Option<u32>,
}

impl<R: BufRead + Send + 'static> FeedSource<R> {
    pub fn new(reader: R, selector: ProcessSelector) -> Self {
        let locked_pid = match selector {
            ProcessSelector::Id(pid) => Some(pid),
            ProcessSelector::Name(_) => None,
        };
        Self {
            reader,
            selector,
            locked_pid,
        }
    }

    fn matches(&mut self, record: &TraceRecord) -> bool {
        if let Some(pid) = self.locked_pid {
            return record.pid == pid;
        }
        let ProcessSelector::Name(name) = &self.selector else {
            return false;
        };
        if record.process_name.as_deref() == Some(name.as_str()) {
            tracing::info!(pid = record.pid, name = %name, "target process resolved");
            self.locked_pid = Some(record.pid);
            return true;
        }
        false
    }
}

impl<R: BufRead + Send + 'static> TraceSource for FeedSource<R> {
    fn target(&self) -> TargetProcess {
        TargetProcess {
            pid: self.locked_pid,
            name: match &self.selector {
                ProcessSelector::Name(name) => Some(name.clone()),
                ProcessSelector::Id(_) => None,
            },
        }
    }

    fn process(
        &mut self,
        stop: &CancellationToken,
        on_gc_end: &mut dyn FnMut(GcEvent),
    ) -> Result<(), SourceError> {
        let mut line = String::new();
        let mut line_no = 0u64;
        while !stop.is_cancelled() {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                tracing::info!(lines = line_no, "trace feed ended");
                return Ok(());
            }
            line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceRecord>(trimmed) {
                Ok(record) => {
                    if self.matches(&record) {
                        on_gc_end(record.gc);
                    }
                }
                Err(err) => {
                    tracing::warn!(line = line_no, %err, "skipping malformed trace record");
                }
            }
        }
        Ok(())
    }
}

/// Disposable handle over a running source.
pub struct Subscription {
    stop: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Starts `source` on a dedicated thread.
    ///
    /// `on_end` runs on that thread after the loop returns and after
    /// `ingest` (and with it the row sender) has been dropped.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<S, F>(mut source: S, ingest: GcIngest, on_end: F) -> io::Result<Self>
    where
        S: TraceSource,
        F: FnOnce(Result<(), SourceError>) + Send + 'static,
    {
        let stop = CancellationToken::new();
        let thread_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("gcmon-trace".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    source.process(&thread_stop, &mut |gc| {
                        ingest.on_gc_end(gc);
                    })
                }))
                .unwrap_or(Err(SourceError::Panicked));
                drop(ingest);
                on_end(result);
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Asks the source to stop and detaches from it.
    ///
    /// Does not wait: a source blocked in a read only notices once the read
    /// returns, and the process may exit before that.
    pub fn dispose(mut self) {
        self.stop.cancel();
        self.thread.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
