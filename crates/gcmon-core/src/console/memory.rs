use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::Console;
use crate::capture::HeapSnapshot;
use crate::columns::{Row, TableLayout};
use crate::source::TargetProcess;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Entry {
    ProcessInfo(TargetProcess),
    Usage(bool),
    BeginTable,
    Row(Row),
    EndTable,
    Snapshot(Option<u64>),
    Notice(String),
    Warning(String),
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
    table_open: bool,
    /// Writes that happened while they should not have.
    violations: Vec<String>,
}

/// Records console calls and checks the table/snapshot exclusion.
#[derive(Debug, Default)]
pub(crate) struct MemoryConsole {
    state: Mutex<State>,
    fail_snapshots: AtomicBool,
    panic_snapshots: AtomicBool,
    panic_rows: AtomicBool,
}

impl MemoryConsole {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn fail_snapshots(&self, fail: bool) {
        self.fail_snapshots.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn panic_snapshots(&self, panic: bool) {
        self.panic_snapshots.store(panic, Ordering::SeqCst);
    }

    pub(crate) fn panic_rows(&self, panic: bool) {
        self.panic_rows.store(panic, Ordering::SeqCst);
    }

    pub(crate) fn entries(&self) -> Vec<Entry> {
        self.state().entries.clone()
    }

    /// GC numbers of rendered rows, in render order.
    pub(crate) fn rendered(&self) -> Vec<String> {
        self.state()
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Row(row) => row.cells.first().cloned(),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn snapshots(&self) -> Vec<Option<u64>> {
        self.state()
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Snapshot(number) => Some(*number),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn violations(&self) -> Vec<String> {
        self.state().violations.clone()
    }

    pub(crate) fn table_open(&self) -> bool {
        self.state().table_open
    }
}

impl Console for MemoryConsole {
    fn write_process_info(&self, target: &TargetProcess) -> io::Result<()> {
        self.state().entries.push(Entry::ProcessInfo(target.clone()));
        Ok(())
    }

    fn write_usage(&self, keys: bool) -> io::Result<()> {
        self.state().entries.push(Entry::Usage(keys));
        Ok(())
    }

    fn begin_table(&self, _layout: &TableLayout) -> io::Result<()> {
        let mut state = self.state();
        if state.table_open {
            state.violations.push("table opened twice".to_string());
        }
        state.table_open = true;
        state.entries.push(Entry::BeginTable);
        Ok(())
    }

    fn write_row(&self, row: &Row) -> io::Result<()> {
        assert!(!self.panic_rows.load(Ordering::SeqCst), "row renderer panicked");
        let mut state = self.state();
        if !state.table_open {
            state.violations.push(format!("row {:?} outside table", row.cells.first()));
        }
        state.entries.push(Entry::Row(row.clone()));
        Ok(())
    }

    fn end_table(&self) -> io::Result<()> {
        let mut state = self.state();
        state.table_open = false;
        state.entries.push(Entry::EndTable);
        Ok(())
    }

    fn write_snapshot(&self, snapshot: Option<&HeapSnapshot>) -> io::Result<()> {
        {
            let mut state = self.state();
            if state.table_open {
                state.violations.push("snapshot while table live".to_string());
            }
        }
        assert!(
            !self.panic_snapshots.load(Ordering::SeqCst),
            "snapshot renderer panicked"
        );
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(io::Error::other("snapshot render failed"));
        }
        self.state()
            .entries
            .push(Entry::Snapshot(snapshot.map(|s| s.number)));
        Ok(())
    }

    fn write_notice(&self, message: &str) -> io::Result<()> {
        self.state().entries.push(Entry::Notice(message.to_string()));
        Ok(())
    }

    fn write_warning(&self, message: &str) -> io::Result<()> {
        self.state().entries.push(Entry::Warning(message.to_string()));
        Ok(())
    }
}
