//! Column registry: maps a configured column key to a formatted cell.
//!
//! The registry is a pure lookup table. Resolving the configured keys
//! happens once at startup (`ColumnSet`), after which building a row for an
//! event cannot fail as a whole: a cell whose value cannot be computed is
//! replaced by [`PLACEHOLDER`].

use std::fmt::Write as _;
use std::iter;
use std::sync::Arc;

use gcmon_types::{GcEvent, Generation, GenerationStats};

/// Cell text used when a column cannot be computed for an event.
pub const PLACEHOLDER: &str = "n/a";

/// Key of the implicit leading column.
pub const INDEX_COLUMN: &str = "index";

/// Header label printed in front of the index column.
pub const INDEX_LABEL: &str = "GC#";

/// A configured key has no registered extractor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Column '{0}' is not a known column. Run `gcmon config columns` to list them.")]
pub struct UnknownColumn(pub String);

/// Failure to compute a single cell.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColumnError {
    #[error("event has no {0} entry")]
    MissingGeneration(&'static str),
    #[error("value is not finite ({0})")]
    NonFinite(f64),
}

/// `.NET`-style `N<d>` numeric format: thousands separators, `d` decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub decimals: usize,
}

impl NumberFormat {
    pub const fn n(decimals: usize) -> Self {
        Self { decimals }
    }

    pub fn format(self, value: f64) -> String {
        let raw = format!("{:.*}", self.decimals, value.abs());
        let (int_part, frac_part) = match raw.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (raw.as_str(), None),
        };

        let mut out = String::with_capacity(raw.len() + int_part.len() / 3 + 1);
        let is_zero = raw.bytes().all(|b| b == b'0' || b == b'.');
        if value.is_sign_negative() && !is_zero {
            out.push('-');
        }
        out.push_str(&group_thousands(int_part));
        if let Some(frac) = frac_part {
            out.push('.');
            out.push_str(frac);
        }
        out
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut grouped = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Raw value produced by an extractor, formatted later.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(&'static str),
    Integer(u64),
    Number(f64),
}

impl CellValue {
    fn render(&self, format: Option<NumberFormat>) -> Result<String, ColumnError> {
        match (self, format) {
            (CellValue::Text(text), _) => Ok((*text).to_string()),
            (CellValue::Integer(value), None) => Ok(value.to_string()),
            (CellValue::Integer(value), Some(fmt)) => Ok(fmt.format(*value as f64)),
            (CellValue::Number(value), _) if !value.is_finite() => {
                Err(ColumnError::NonFinite(*value))
            }
            (CellValue::Number(value), None) => Ok(value.to_string()),
            (CellValue::Number(value), Some(fmt)) => Ok(fmt.format(*value)),
        }
    }
}

/// Which metric of the event a column reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Index,
    Type,
    Generation,
    Pause,
    Reason,
    Suspension,
    PauseTimePercent,
    Gen0Alloc,
    Gen0AllocRate,
    PeakSize,
    AfterSize,
    PeakAfterRatio,
    Promoted,
    FinalizePromoted,
    PinnedObjects,
    GenSize(Generation),
    GenSurvival(Generation),
    GenFragmentation(Generation),
}

impl Metric {
    pub fn extract(self, gc: &GcEvent) -> Result<CellValue, ColumnError> {
        let value = match self {
            Metric::Index => CellValue::Integer(gc.number),
            Metric::Type => CellValue::Text(gc.gc_type.as_str()),
            Metric::Generation => CellValue::Integer(u64::from(gc.generation)),
            Metric::Pause => CellValue::Number(gc.pause_duration_msec),
            Metric::Reason => CellValue::Text(gc.reason.as_str()),
            Metric::Suspension => CellValue::Number(gc.suspend_duration_msec),
            Metric::PauseTimePercent => CellValue::Number(gc.pause_time_percentage_since_last_gc),
            Metric::Gen0Alloc => CellValue::Number(gen0_alloc(gc)?),
            Metric::Gen0AllocRate => {
                CellValue::Number(gen0_alloc(gc)? * 1000.0 / gc.duration_since_last_restart_msec)
            }
            Metric::PeakSize => CellValue::Number(gc.heap_size_peak_mb),
            Metric::AfterSize => CellValue::Number(gc.heap_size_after_mb),
            Metric::PeakAfterRatio => {
                CellValue::Number(gc.heap_size_peak_mb / gc.heap_size_after_mb)
            }
            Metric::Promoted => CellValue::Number(gc.promoted_mb),
            Metric::FinalizePromoted => {
                CellValue::Number(gc.heap_stats.finalization_promoted_size as f64 / 1_000_000.0)
            }
            Metric::PinnedObjects => CellValue::Integer(gc.heap_stats.pinned_object_count),
            Metric::GenSize(generation) => {
                CellValue::Number(generation_stats(gc, generation)?.size_after_mb)
            }
            Metric::GenSurvival(generation) => {
                CellValue::Number(generation_stats(gc, generation)?.survival_percent)
            }
            Metric::GenFragmentation(generation) => {
                CellValue::Number(generation_stats(gc, generation)?.fragmentation_percent)
            }
        };
        Ok(value)
    }
}

fn gen0_alloc(gc: &GcEvent) -> Result<f64, ColumnError> {
    gc.user_allocated(Generation::Gen0)
        .ok_or(ColumnError::MissingGeneration(Generation::Gen0.label()))
}

fn generation_stats(gc: &GcEvent, generation: Generation) -> Result<&GenerationStats, ColumnError> {
    gc.generation_stats(generation)
        .ok_or(ColumnError::MissingGeneration(generation.label()))
}

/// Presentation details of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    /// Right-alignment width in the plain-text table.
    pub width: usize,
    pub format: Option<NumberFormat>,
    pub description: String,
    pub metric: Metric,
}

impl ColumnInfo {
    fn new(name: impl Into<String>, metric: Metric, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            width: name.chars().count(),
            name,
            format: None,
            description: description.into(),
            metric,
        }
    }

    fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    fn format(mut self, format: NumberFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Formats the cell for `gc`, unpadded.
    ///
    /// # Errors
    /// Returns an error if the value is missing or not finite.
    pub fn cell(&self, gc: &GcEvent) -> Result<String, ColumnError> {
        self.metric.extract(gc)?.render(self.format)
    }
}

/// The set of columns known to gcmon.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    columns: Vec<ColumnInfo>,
}

impl ColumnRegistry {
    pub fn builtin() -> Self {
        let mut columns = vec![
            ColumnInfo::new(INDEX_COLUMN, Metric::Index, "GC run number").width(10),
            ColumnInfo::new("type", Metric::Type, "Kind of GC").width(15),
            ColumnInfo::new("gen", Metric::Generation, "Generation collected").width(5),
            ColumnInfo::new("pause (ms)", Metric::Pause, "Pause duration")
                .width(10)
                .format(NumberFormat::n(2)),
            ColumnInfo::new("reason", Metric::Reason, "Why the GC was triggered").width(21),
            ColumnInfo::new(
                "suspension time (ms)",
                Metric::Suspension,
                "Time taken to suspend managed threads",
            )
            .format(NumberFormat::n(3)),
            ColumnInfo::new(
                "pause time (%)",
                Metric::PauseTimePercent,
                "Pause time as a percentage of the time since the last GC",
            )
            .format(NumberFormat::n(1)),
            ColumnInfo::new(
                "gen0 alloc (mb)",
                Metric::Gen0Alloc,
                "Gen0 bytes allocated by user code since the last GC",
            )
            .format(NumberFormat::n(3)),
            ColumnInfo::new(
                "gen0 alloc rate",
                Metric::Gen0AllocRate,
                "Gen0 allocation rate (MB/s) since the last restart",
            )
            .format(NumberFormat::n(2)),
            ColumnInfo::new("peak size (mb)", Metric::PeakSize, "Heap size before the GC")
                .format(NumberFormat::n(3)),
            ColumnInfo::new("after size (mb)", Metric::AfterSize, "Heap size after the GC")
                .format(NumberFormat::n(3)),
            ColumnInfo::new(
                "peak/after",
                Metric::PeakAfterRatio,
                "Ratio of peak to after heap size",
            )
            .format(NumberFormat::n(2)),
            ColumnInfo::new("promoted (mb)", Metric::Promoted, "Memory promoted by this GC")
                .format(NumberFormat::n(3)),
            ColumnInfo::new(
                "finalize promoted (mb)",
                Metric::FinalizePromoted,
                "Memory promoted because of finalization",
            )
            .format(NumberFormat::n(2)),
            ColumnInfo::new(
                "pinned objects",
                Metric::PinnedObjects,
                "Number of pinned objects observed",
            )
            .format(NumberFormat::n(0)),
        ];

        for generation in Generation::ALL {
            let label = generation.label();
            columns.push(
                ColumnInfo::new(
                    format!("{label} size (mb)"),
                    Metric::GenSize(generation),
                    format!("Size of {label} after the GC"),
                )
                .format(NumberFormat::n(3)),
            );
            columns.push(
                ColumnInfo::new(
                    format!("{label} survival rate"),
                    Metric::GenSurvival(generation),
                    format!("Percentage of {label} that survived"),
                )
                .format(NumberFormat::n(0)),
            );
            columns.push(
                ColumnInfo::new(
                    format!("{label} frag ratio"),
                    Metric::GenFragmentation(generation),
                    format!("Fragmentation of {label} as a percentage"),
                )
                .format(NumberFormat::n(0)),
            );
        }

        Self { columns }
    }

    /// Looks up a column by key.
    ///
    /// # Errors
    /// Returns `UnknownColumn` if the key is not registered.
    pub fn get(&self, key: &str) -> Result<&ColumnInfo, UnknownColumn> {
        self.columns
            .iter()
            .find(|c| c.name == key)
            .ok_or_else(|| UnknownColumn(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter()
    }

    /// Resolves the configured keys into a `ColumnSet`.
    ///
    /// The index column is always the leading column; a configured `index`
    /// key is ignored.
    ///
    /// # Errors
    /// Returns the first key that is not registered.
    pub fn resolve<S: AsRef<str>>(&self, keys: &[S]) -> Result<ColumnSet, UnknownColumn> {
        let index = self.get(INDEX_COLUMN)?.clone();
        let columns = keys
            .iter()
            .map(AsRef::as_ref)
            .filter(|key| *key != INDEX_COLUMN)
            .map(|key| self.get(key).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ColumnSet {
            inner: Arc::new(ColumnSetInner { index, columns }),
        })
    }
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// One formatted table row: index cell first, then one cell per column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub generation: u32,
    pub cells: Vec<String>,
}

#[derive(Debug)]
struct ColumnSetInner {
    index: ColumnInfo,
    columns: Vec<ColumnInfo>,
}

/// Resolved, validated display columns. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ColumnSet {
    inner: Arc<ColumnSetInner>,
}

impl ColumnSet {
    pub fn len(&self) -> usize {
        self.inner.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.columns.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.columns.iter().map(|c| c.name.as_str())
    }

    /// Builds the row for `gc`. Returns the row and the number of cells
    /// that were replaced by the placeholder.
    pub fn row(&self, gc: &GcEvent) -> (Row, usize) {
        let mut failed = 0;
        let cells = iter::once(&self.inner.index)
            .chain(self.inner.columns.iter())
            .map(|column| match column.cell(gc) {
                Ok(cell) => cell,
                Err(err) => {
                    failed += 1;
                    tracing::debug!(
                        column = %column.name,
                        gc = gc.number,
                        %err,
                        "placeholder cell"
                    );
                    PLACEHOLDER.to_string()
                }
            })
            .collect();

        (
            Row {
                generation: gc.generation,
                cells,
            },
            failed,
        )
    }

    pub fn layout(&self) -> TableLayout {
        TableLayout {
            index_width: self.inner.index.width,
            columns: self
                .inner
                .columns
                .iter()
                .map(|c| ColumnHeader {
                    name: c.name.clone(),
                    width: c.width,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeader {
    pub name: String,
    pub width: usize,
}

/// Header names and widths handed to consoles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub index_width: usize,
    pub columns: Vec<ColumnHeader>,
}

impl TableLayout {
    /// `GC#     index |            type | ...`
    pub fn header_line(&self) -> String {
        let mut line = format!("{INDEX_LABEL}{:>w$} |", INDEX_COLUMN, w = self.index_width);
        for column in &self.columns {
            let _ = write!(line, " {:>w$} |", column.name, w = column.width);
        }
        line
    }

    pub fn separator(&self) -> String {
        let width = 5 + self.index_width + self.columns.iter().map(|c| c.width + 3).sum::<usize>();
        "-".repeat(width)
    }

    pub fn format_row(&self, row: &Row) -> String {
        let mut cells = row.cells.iter();
        let index = cells.next().map_or(PLACEHOLDER, String::as_str);
        let mut line = format!("{INDEX_LABEL}{index:>w$} |", w = self.index_width);
        for (column, cell) in self.columns.iter().zip(cells) {
            let _ = write!(line, " {cell:>w$} |", w = column.width);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use gcmon_types::{GcReason, GcType};

    use super::*;

    const DEFAULT_COLUMNS: [&str; 4] = ["type", "gen", "pause (ms)", "reason"];

    fn sample_event() -> GcEvent {
        GcEvent {
            number: 430,
            generation: 0,
            gc_type: GcType::NonConcurrentGc,
            reason: GcReason::AllocSmall,
            pause_duration_msec: 7.38,
            ..GcEvent::default()
        }
    }

    #[test]
    fn test_number_format_groups_thousands() {
        assert_eq!(NumberFormat::n(0).format(1_234_567.0), "1,234,567");
        assert_eq!(NumberFormat::n(2).format(1234.5), "1,234.50");
        assert_eq!(NumberFormat::n(3).format(0.0), "0.000");
        assert_eq!(NumberFormat::n(1).format(-9876.54), "-9,876.5");
        assert_eq!(NumberFormat::n(2).format(-0.001), "0.00");
        assert_eq!(NumberFormat::n(0).format(999.0), "999");
    }

    #[test]
    fn test_header_matches_classic_layout() {
        let set = ColumnRegistry::builtin().resolve(&DEFAULT_COLUMNS).unwrap();
        assert_eq!(
            set.layout().header_line(),
            "GC#     index |            type |   gen | pause (ms) |                reason |"
        );
    }

    #[test]
    fn test_separator_width() {
        let set = ColumnRegistry::builtin().resolve(&DEFAULT_COLUMNS).unwrap();
        assert_eq!(set.layout().separator(), "-".repeat(78));
    }

    #[test]
    fn test_row_for_default_columns() {
        let set = ColumnRegistry::builtin().resolve(&DEFAULT_COLUMNS).unwrap();
        let (row, failed) = set.row(&sample_event());

        assert_eq!(failed, 0);
        assert_eq!(row.cells, vec!["430", "NonConcurrentGC", "0", "7.38", "AllocSmall"]);
        assert_eq!(
            set.layout().format_row(&row),
            "GC#       430 | NonConcurrentGC |     0 |       7.38 |            AllocSmall |"
        );
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let err = ColumnRegistry::builtin()
            .resolve(&["type", "bogus"])
            .unwrap_err();
        assert_eq!(err, UnknownColumn("bogus".to_string()));
    }

    #[test]
    fn test_configured_index_is_implicit() {
        let set = ColumnRegistry::builtin().resolve(&["index", "gen"]).unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["gen"]);
    }

    #[test]
    fn test_missing_generation_uses_placeholder() {
        let set = ColumnRegistry::builtin()
            .resolve(&["gen", "loh size (mb)", "gen0 alloc (mb)"])
            .unwrap();
        let (row, failed) = set.row(&sample_event());

        assert_eq!(failed, 2);
        assert_eq!(row.cells, vec!["430", "0", PLACEHOLDER, PLACEHOLDER]);
    }

    #[test]
    fn test_non_finite_ratio_uses_placeholder() {
        let set = ColumnRegistry::builtin().resolve(&["peak/after"]).unwrap();
        let (row, failed) = set.row(&sample_event());

        assert_eq!(failed, 1);
        assert_eq!(row.cells[1], PLACEHOLDER);
    }

    #[test]
    fn test_generation_columns_read_stats() {
        let mut gc = sample_event();
        gc.generations = vec![
            GenerationStats::default(),
            GenerationStats::default(),
            GenerationStats {
                size_after_mb: 1234.5678,
                survival_percent: 42.4,
                fragmentation_percent: 3.6,
            },
        ];
        let set = ColumnRegistry::builtin()
            .resolve(&["gen2 size (mb)", "gen2 survival rate", "gen2 frag ratio"])
            .unwrap();
        let (row, _) = set.row(&gc);

        assert_eq!(row.cells[1..], ["1,234.568", "42", "4"]);
    }

    #[test]
    fn test_default_width_is_name_length() {
        let registry = ColumnRegistry::builtin();
        assert_eq!(registry.get("pinned objects").unwrap().width, 14);
        assert_eq!(registry.get("reason").unwrap().width, 21);
    }
}
