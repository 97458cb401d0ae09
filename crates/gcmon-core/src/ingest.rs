//! Per-record entry point called from the trace source thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gcmon_types::GcEvent;

use crate::capture::{CapturedEvent, GcTimeAccumulator, LastEventSlot};
use crate::columns::ColumnSet;
use crate::filter::EventFilter;
use crate::queue::RowSender;

/// Counters kept across the whole run.
#[derive(Debug, Default)]
pub struct IngestStats {
    seen: AtomicU64,
    accepted: AtomicU64,
    placeholder_cells: AtomicU64,
}

impl IngestStats {
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.seen().saturating_sub(self.accepted())
    }

    pub fn placeholder_cells(&self) -> u64 {
        self.placeholder_cells.load(Ordering::Relaxed)
    }
}

/// Filters each record, publishes it as the latest event and queues its
/// row. Never blocks and never touches the terminal.
pub struct GcIngest {
    filter: EventFilter,
    columns: ColumnSet,
    slot: Arc<LastEventSlot>,
    totals: Arc<GcTimeAccumulator>,
    rows: RowSender,
    stats: Arc<IngestStats>,
}

impl GcIngest {
    pub fn new(
        filter: EventFilter,
        columns: ColumnSet,
        slot: Arc<LastEventSlot>,
        totals: Arc<GcTimeAccumulator>,
        rows: RowSender,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            filter,
            columns,
            slot,
            totals,
            rows,
            stats,
        }
    }

    /// Returns whether the record passed the filter.
    pub fn on_gc_end(&self, gc: GcEvent) -> bool {
        self.stats.seen.fetch_add(1, Ordering::Relaxed);
        if !self.filter.accept(&gc) {
            tracing::trace!(gc = gc.number, pause = gc.pause_duration_msec, "below threshold");
            return false;
        }
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);

        let captured = CapturedEvent::now(gc);
        self.slot.set(Arc::clone(&captured));
        self.totals.record(&captured.event);

        let (row, failed) = self.columns.row(&captured.event);
        if failed > 0 {
            self.stats
                .placeholder_cells
                .fetch_add(failed as u64, Ordering::Relaxed);
        }
        self.rows.enqueue(row);
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use gcmon_types::{GcReason, GcType};

    use super::*;
    use crate::columns::{ColumnRegistry, PLACEHOLDER, Row};
    use crate::queue::RowQueue;

    pub(crate) struct IngestParts {
        pub(crate) slot: Arc<LastEventSlot>,
        pub(crate) totals: Arc<GcTimeAccumulator>,
        pub(crate) stats: Arc<IngestStats>,
        pub(crate) queue: RowQueue,
    }

    impl IngestParts {
        pub(crate) fn drain(&self) -> Vec<Row> {
            self.queue.drain_now()
        }

        /// Index cells of the queued rows.
        pub(crate) fn drain_rows(&self) -> Vec<String> {
            self.drain().into_iter().map(|row| row.cells[0].clone()).collect()
        }
    }

    pub(crate) fn ingest_with_columns(
        min_pause: Option<f64>,
        columns: &[&str],
    ) -> (GcIngest, IngestParts) {
        let (tx, queue) = RowQueue::channel();
        let parts = IngestParts {
            slot: Arc::new(LastEventSlot::new()),
            totals: Arc::new(GcTimeAccumulator::new()),
            stats: Arc::new(IngestStats::default()),
            queue,
        };
        let ingest = GcIngest::new(
            EventFilter::new(min_pause),
            ColumnRegistry::builtin().resolve(columns).unwrap(),
            Arc::clone(&parts.slot),
            Arc::clone(&parts.totals),
            tx,
            Arc::clone(&parts.stats),
        );
        (ingest, parts)
    }

    pub(crate) fn ingest_parts(min_pause: Option<f64>) -> (GcIngest, IngestParts) {
        ingest_with_columns(min_pause, &["type", "gen", "pause (ms)", "reason"])
    }

    fn gc(number: u64, pause: f64) -> GcEvent {
        GcEvent {
            number,
            pause_duration_msec: pause,
            ..GcEvent::default()
        }
    }

    #[test]
    fn test_accepted_event_updates_slot_and_queue() {
        let (ingest, parts) = ingest_parts(None);
        let event = GcEvent {
            number: 430,
            generation: 0,
            gc_type: GcType::NonConcurrentGc,
            reason: GcReason::AllocSmall,
            pause_duration_msec: 7.38,
            ..GcEvent::default()
        };

        assert!(ingest.on_gc_end(event.clone()));

        let rows = parts.drain();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[1..], ["NonConcurrentGC", "0", "7.38", "AllocSmall"]);
        assert_eq!(parts.slot.get().unwrap().event, event);
        assert_eq!(parts.totals.totals().accepted, 1);
    }

    #[test]
    fn test_threshold_drops_short_pauses_without_side_effects() {
        let (ingest, parts) = ingest_parts(Some(5.0));

        assert!(!ingest.on_gc_end(gc(1, 3.0)));
        assert!(parts.slot.is_empty());
        assert!(parts.drain().is_empty());
        assert_eq!(parts.totals.totals().accepted, 0);

        assert!(ingest.on_gc_end(gc(2, 9.0)));
        assert_eq!(parts.drain_rows(), vec!["2"]);
        assert_eq!(parts.slot.get().unwrap().event.number, 2);
        assert_eq!(parts.stats.seen(), 2);
        assert_eq!(parts.stats.rejected(), 1);
    }

    #[test]
    fn test_rejected_after_accepted_keeps_slot() {
        let (ingest, parts) = ingest_parts(Some(5.0));
        ingest.on_gc_end(gc(1, 9.0));
        ingest.on_gc_end(gc(2, 1.0));

        assert_eq!(parts.slot.get().unwrap().event.number, 1);
        assert_eq!(parts.drain_rows(), vec!["1"]);
    }

    #[test]
    fn test_bad_cells_still_enqueue_the_row() {
        let (ingest, parts) = ingest_with_columns(None, &["gen", "gen2 size (mb)", "peak/after"]);
        ingest.on_gc_end(gc(5, 1.0));

        let rows = parts.drain();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells, vec!["5", "0", PLACEHOLDER, PLACEHOLDER]);
        assert_eq!(parts.stats.placeholder_cells(), 2);
    }

    #[test]
    fn test_rows_keep_arrival_order() {
        let (ingest, parts) = ingest_parts(None);
        for n in 0..200 {
            ingest.on_gc_end(gc(n, 1.0));
        }
        let expected: Vec<String> = (0..200).map(|n: u64| n.to_string()).collect();
        assert_eq!(parts.drain_rows(), expected);
    }
}
