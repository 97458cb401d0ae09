use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use super::{
    Console, LineEnding, NO_STATS, SECTION_RULE, SharedWriter, process_line, time_in_gc_line,
    usage_line,
};
use crate::capture::HeapSnapshot;
use crate::columns::{NumberFormat, Row, TableLayout};
use crate::source::TargetProcess;

/// Classic fixed-width text output, no colours or cursor control.
pub struct PlainConsole {
    writer: SharedWriter,
    layout: Mutex<Option<TableLayout>>,
}

impl PlainConsole {
    pub fn new(out: Box<dyn Write + Send>, newline: LineEnding) -> Self {
        Self {
            writer: SharedWriter::new(out, newline),
            layout: Mutex::new(None),
        }
    }
}

pub(crate) fn snapshot_lines(snapshot: &HeapSnapshot) -> Vec<String> {
    let n0 = NumberFormat::n(0);
    let mut lines = vec![
        SECTION_RULE.to_string(),
        format!(
            "Heap Stats as of {} (Run {} for gen {}):",
            snapshot.timestamp(),
            snapshot.number,
            snapshot.generation
        ),
        format!("  Heaps: {}", n0.format(f64::from(snapshot.heap_count))),
        format!("  Handles: {}", n0.format(snapshot.handle_count as f64)),
        format!(
            "  Pinned Obj Count: {}",
            n0.format(snapshot.pinned_object_count as f64)
        ),
        "  Last Run Stats:".to_string(),
        format!(
            "    Total Heap: {} Bytes",
            n0.format(snapshot.total_heap_size as f64)
        ),
    ];
    for (generation, size) in snapshot.generation_sizes.iter().enumerate() {
        lines.push(format!(
            "      Gen {generation}: {:>17} Bytes",
            n0.format(*size as f64)
        ));
    }
    lines.push(format!("  Time in GC: {}", time_in_gc_line(&snapshot.time_in_gc)));
    lines.push(SECTION_RULE.to_string());
    lines
}

impl Console for PlainConsole {
    fn write_process_info(&self, target: &TargetProcess) -> io::Result<()> {
        self.writer.write_lines([process_line(target)])
    }

    fn write_usage(&self, keys: bool) -> io::Result<()> {
        self.writer.write_lines([format!("------- {} -------", usage_line(keys))])
    }

    fn begin_table(&self, layout: &TableLayout) -> io::Result<()> {
        *self.layout.lock().unwrap_or_else(PoisonError::into_inner) = Some(layout.clone());
        self.writer.write_lines([layout.header_line(), layout.separator()])
    }

    fn write_row(&self, row: &Row) -> io::Result<()> {
        let line = match &*self.layout.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(layout) => layout.format_row(row),
            None => row.cells.join(" | "),
        };
        self.writer.write_lines([line])
    }

    fn end_table(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }

    fn write_snapshot(&self, snapshot: Option<&HeapSnapshot>) -> io::Result<()> {
        match snapshot {
            Some(snapshot) => self.writer.write_lines(snapshot_lines(snapshot)),
            None => self.writer.write_lines([NO_STATS]),
        }
    }

    fn write_notice(&self, message: &str) -> io::Result<()> {
        self.writer.write_lines([message])
    }

    fn write_warning(&self, message: &str) -> io::Result<()> {
        self.writer.write_lines([message])
    }
}
