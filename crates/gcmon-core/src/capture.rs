//! Latest-event slot, time-in-GC accumulator and snapshot panel data.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use gcmon_types::{GcEvent, HEAP_GENERATIONS};

/// A GC event together with the wall-clock time it arrived.
///
/// Always handled behind an `Arc` so that the pair is replaced as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub arrived_at: DateTime<Utc>,
    pub event: GcEvent,
}

impl CapturedEvent {
    pub fn now(event: GcEvent) -> Arc<Self> {
        Arc::new(Self {
            arrived_at: Utc::now(),
            event,
        })
    }
}

/// Holds the most recently accepted event.
///
/// Writers swap the whole `Arc`; readers get a fully formed
/// `CapturedEvent` or nothing, never a mix of two writes.
#[derive(Debug, Default)]
pub struct LastEventSlot {
    latest: ArcSwapOption<CapturedEvent>,
}

impl LastEventSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, captured: Arc<CapturedEvent>) {
        self.latest.store(Some(captured));
    }

    pub fn get(&self) -> Option<Arc<CapturedEvent>> {
        self.latest.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.load().is_none()
    }
}

/// Cumulative pause time of accepted events since the monitor started.
///
/// Lives for the whole process; snapshot and restart cycles never reset it.
#[derive(Debug)]
pub struct GcTimeAccumulator {
    started: Instant,
    accepted: AtomicU64,
    pause_nanos: AtomicU64,
}

impl GcTimeAccumulator {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            accepted: AtomicU64::new(0),
            pause_nanos: AtomicU64::new(0),
        }
    }

    pub fn record(&self, gc: &GcEvent) {
        let pause = Duration::try_from_secs_f64(gc.pause_duration_msec / 1000.0)
            .unwrap_or_default();
        let nanos = u64::try_from(pause.as_nanos()).unwrap_or(u64::MAX);
        self.pause_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn totals(&self) -> GcTimeTotals {
        self.totals_at(Instant::now())
    }

    pub fn totals_at(&self, now: Instant) -> GcTimeTotals {
        GcTimeTotals {
            accepted: self.accepted.load(Ordering::Relaxed),
            total_pause: Duration::from_nanos(self.pause_nanos.load(Ordering::Relaxed)),
            elapsed: now.saturating_duration_since(self.started),
        }
    }
}

impl Default for GcTimeAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time read of [`GcTimeAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcTimeTotals {
    pub accepted: u64,
    pub total_pause: Duration,
    pub elapsed: Duration,
}

impl GcTimeTotals {
    /// Share of monitored wall time spent paused in accepted GCs.
    pub fn percent_in_gc(&self) -> Option<f64> {
        if self.elapsed.is_zero() {
            return None;
        }
        Some(self.total_pause.as_secs_f64() / self.elapsed.as_secs_f64() * 100.0)
    }
}

/// Everything the snapshot panel prints, computed from one captured event.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapSnapshot {
    pub arrived_at: DateTime<Utc>,
    pub number: u64,
    pub generation: u32,
    pub heap_count: u32,
    pub handle_count: u64,
    pub pinned_object_count: u64,
    pub total_heap_size: u64,
    pub generation_sizes: [u64; HEAP_GENERATIONS],
    pub time_in_gc: GcTimeTotals,
}

impl HeapSnapshot {
    pub fn from_captured(captured: &CapturedEvent, time_in_gc: GcTimeTotals) -> Self {
        let gc = &captured.event;
        let stats = &gc.heap_stats;
        Self {
            arrived_at: captured.arrived_at,
            number: gc.number,
            generation: gc.generation,
            heap_count: gc.heap_count,
            handle_count: stats.gc_handle_count,
            pinned_object_count: stats.pinned_object_count,
            total_heap_size: stats.total_heap_size,
            generation_sizes: stats.generation_sizes,
            time_in_gc,
        }
    }

    pub fn timestamp(&self) -> String {
        self.arrived_at.format("%Y-%m-%d %H:%M:%SZ").to_string()
    }

    /// Percentage of the total heap held by generation `index` (0..=4).
    pub fn generation_share(&self, index: usize) -> Option<f64> {
        let size = *self.generation_sizes.get(index)?;
        if self.total_heap_size == 0 {
            return None;
        }
        Some(size as f64 / self.total_heap_size as f64 * 100.0)
    }
}
