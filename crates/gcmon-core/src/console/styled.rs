use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};

use super::theme::table_color;
use super::{
    Console, LineEnding, NO_STATS, SharedWriter, Theme, process_line, time_in_gc_line, usage_line,
};
use crate::capture::HeapSnapshot;
use crate::columns::{NumberFormat, Row, TableLayout};
use crate::source::TargetProcess;

const RULE_WIDTH: usize = 78;
const SHARE_BAR_WIDTH: f64 = 30.0;

/// Coloured output: rows tinted by generation, boxed snapshot panel.
pub struct StyledConsole {
    writer: SharedWriter,
    theme: Theme,
    layout: Mutex<Option<TableLayout>>,
}

impl StyledConsole {
    pub fn new(out: Box<dyn Write + Send>, theme: Theme, newline: LineEnding) -> Self {
        Self {
            writer: SharedWriter::new(out, newline),
            theme,
            layout: Mutex::new(None),
        }
    }

    fn write_colored(
        &self,
        color: Color,
        attribute: Option<Attribute>,
        text: &str,
    ) -> io::Result<()> {
        let mut guard = self.writer.lock();
        let out = &mut *guard;
        queue!(out, SetForegroundColor(color))?;
        if let Some(attribute) = attribute {
            queue!(out, SetAttribute(attribute))?;
        }
        queue!(
            out,
            Print(text),
            SetAttribute(Attribute::Reset),
            ResetColor,
            Print(self.writer.newline())
        )?;
        out.flush()
    }

    /// `── text ──────`, padded to the table width.
    fn write_rule(&self, text: &str) -> io::Result<()> {
        let used = text.chars().count() + 4;
        let tail = "─".repeat(RULE_WIDTH.saturating_sub(used).max(2));
        self.write_colored(self.theme.message, None, &format!("── {text} {tail}"))
    }

    fn snapshot_table(&self, snapshot: &HeapSnapshot) -> Table {
        let n0 = NumberFormat::n(0);
        let label = |text: &str| Cell::new(text).fg(table_color(self.theme.header));

        let mut table = Table::new();
        table
            .set_content_arrangement(ContentArrangement::Disabled)
            .enforce_styling()
            .set_header(vec!["", "Bytes", "Share", ""]);

        table.add_row(vec![
            label("Heaps:"),
            right(n0.format(f64::from(snapshot.heap_count))),
            Cell::new(""),
            Cell::new(""),
        ]);
        table.add_row(vec![
            label("Handles:"),
            right(n0.format(snapshot.handle_count as f64)),
            Cell::new(""),
            Cell::new(""),
        ]);
        table.add_row(vec![
            label("Pinned Obj Count:"),
            right(n0.format(snapshot.pinned_object_count as f64)),
            Cell::new(""),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Total Heap").fg(table_color(self.theme.total_heap)),
            right(n0.format(snapshot.total_heap_size as f64)),
            Cell::new(""),
            Cell::new(""),
        ]);

        for (generation, size) in snapshot.generation_sizes.iter().enumerate() {
            let color = table_color(self.theme.heaps[generation]);
            let share = snapshot.generation_share(generation);
            let bar = share.map_or_else(String::new, |share| {
                "█".repeat((share / 100.0 * SHARE_BAR_WIDTH).round() as usize)
            });
            table.add_row(vec![
                Cell::new(format!("Gen {generation}")).fg(color),
                right(n0.format(*size as f64)),
                right(share.map_or_else(|| "n/a".to_string(), |s| format!("{s:.2}%"))),
                Cell::new(bar).fg(color),
            ]);
        }

        table.add_row(vec![
            label("Time in GC:"),
            Cell::new(time_in_gc_line(&snapshot.time_in_gc)),
            Cell::new(""),
            Cell::new(""),
        ]);
        table
    }
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

impl Console for StyledConsole {
    fn write_process_info(&self, target: &TargetProcess) -> io::Result<()> {
        self.write_rule(&process_line(target))
    }

    fn write_usage(&self, keys: bool) -> io::Result<()> {
        self.write_rule(usage_line(keys))
    }

    fn begin_table(&self, layout: &TableLayout) -> io::Result<()> {
        *self.layout.lock().unwrap_or_else(PoisonError::into_inner) = Some(layout.clone());
        self.write_colored(self.theme.header, Some(Attribute::Bold), &layout.header_line())?;
        self.write_colored(self.theme.message, None, &layout.separator())
    }

    fn write_row(&self, row: &Row) -> io::Result<()> {
        let line = match &*self.layout.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(layout) => layout.format_row(row),
            None => row.cells.join(" | "),
        };
        self.write_colored(self.theme.row_color(row.generation), None, &line)
    }

    fn end_table(&self) -> io::Result<()> {
        let mut out = self.writer.lock();
        queue!(&mut *out, ResetColor)?;
        out.flush()
    }

    fn write_snapshot(&self, snapshot: Option<&HeapSnapshot>) -> io::Result<()> {
        let Some(snapshot) = snapshot else {
            return self.write_colored(self.theme.warning, Some(Attribute::Italic), NO_STATS);
        };

        self.write_rule("Last Run Stats")?;
        self.write_colored(
            self.theme.header,
            Some(Attribute::Bold),
            &format!(
                "Heap Stats as of {} (Run {} for gen {}):",
                snapshot.timestamp(),
                snapshot.number,
                snapshot.generation
            ),
        )?;
        let table = self.snapshot_table(snapshot);
        self.writer.write_lines(table.lines())?;
        self.write_rule("")
    }

    fn write_notice(&self, message: &str) -> io::Result<()> {
        self.write_colored(self.theme.message, None, message)
    }

    fn write_warning(&self, message: &str) -> io::Result<()> {
        self.write_colored(self.theme.warning, Some(Attribute::Italic), message)
    }
}
