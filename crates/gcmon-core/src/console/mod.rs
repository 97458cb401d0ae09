//! Terminal output.
//!
//! `Console` is the only way anything reaches the terminal. The live table
//! consumer and the snapshot printer both write through it, but never at
//! the same time: the render session decides who owns the surface.

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capture::{GcTimeTotals, HeapSnapshot};
use crate::columns::{NumberFormat, Row, TableLayout};
use crate::source::TargetProcess;

#[cfg(test)]
pub(crate) mod memory;
mod plain;
mod styled;
pub mod theme;

pub use plain::PlainConsole;
pub use styled::StyledConsole;
pub use theme::{InvalidColor, Theme, ThemeOverrides, ThemePreset};

/// Line ending written after every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    /// Raw mode does not translate `\n`, so rows need an explicit `\r`.
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

pub trait Console: Send + Sync {
    fn write_process_info(&self, target: &TargetProcess) -> io::Result<()>;

    /// Prints how to drive the monitor; `keys` tells whether the key
    /// listener is running.
    fn write_usage(&self, keys: bool) -> io::Result<()>;

    fn begin_table(&self, layout: &TableLayout) -> io::Result<()>;

    fn write_row(&self, row: &Row) -> io::Result<()>;

    fn end_table(&self) -> io::Result<()>;

    /// `None` prints the "no stats yet" notice.
    fn write_snapshot(&self, snapshot: Option<&HeapSnapshot>) -> io::Result<()>;

    fn write_notice(&self, message: &str) -> io::Result<()>;

    fn write_warning(&self, message: &str) -> io::Result<()>;
}

pub(crate) const NO_STATS: &str = "No stats collected yet.";
pub(crate) const SECTION_RULE: &str =
    "------------------------------------------------------------------------------";

pub(crate) fn process_line(target: &TargetProcess) -> String {
    match (&target.name, target.pid) {
        (Some(name), Some(pid)) => {
            format!("Monitoring process with name: {name} and pid: {pid}")
        }
        (Some(name), None) => format!("Monitoring process with name: {name}"),
        (None, Some(pid)) => format!("Monitoring process with pid: {pid}"),
        (None, None) => "Monitoring trace feed".to_string(),
    }
}

pub(crate) fn time_in_gc_line(totals: &GcTimeTotals) -> String {
    let pause_ms = NumberFormat::n(2).format(totals.total_pause.as_secs_f64() * 1000.0);
    let elapsed = totals.elapsed.as_secs_f64();
    match totals.percent_in_gc() {
        Some(percent) => format!(
            "{percent:.2}% of {elapsed:.1}s ({} GCs, {pause_ms} ms paused)",
            totals.accepted
        ),
        None => format!("{} GCs, {pause_ms} ms paused", totals.accepted),
    }
}

pub(crate) fn usage_line(keys: bool) -> &'static str {
    if keys {
        "press s for current stats or any other key to exit"
    } else {
        "press Ctrl+C to exit"
    }
}

/// Writer shared by the console implementations.
pub(crate) struct SharedWriter {
    out: Mutex<Box<dyn Write + Send>>,
    newline: LineEnding,
}

impl SharedWriter {
    pub(crate) fn new(out: Box<dyn Write + Send>, newline: LineEnding) -> Self {
        Self {
            out: Mutex::new(out),
            newline,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn newline(&self) -> &'static str {
        self.newline.as_str()
    }

    /// Writes each line followed by the line ending, then flushes.
    pub(crate) fn write_lines<I, S>(&self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = self.lock();
        for line in lines {
            out.write_all(line.as_ref().as_bytes())?;
            out.write_all(self.newline().as_bytes())?;
        }
        out.flush()
    }
}

/// Picks the console for stdout: plain text when stdout is not a terminal
/// or plain output was requested, styled otherwise.
pub fn for_stdout(theme: Theme, plain_text: bool, newline: LineEnding) -> Arc<dyn Console> {
    if plain_text || !io::stdout().is_terminal() {
        Arc::new(PlainConsole::new(Box::new(io::stdout()), newline))
    } else {
        Arc::new(StyledConsole::new(Box::new(io::stdout()), theme, newline))
    }
}
