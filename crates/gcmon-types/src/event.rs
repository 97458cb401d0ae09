//! GC completion record model.
//!
//! One `GcEvent` is delivered per finished garbage collection of the
//! monitored process. Every field defaults when absent so that partially
//! populated records still reach the display; per-generation data is
//! exposed through `Option` accessors so short arrays surface as column
//! errors instead of panics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of generations tracked by the heap statistics (gen0..gen4).
pub const HEAP_GENERATIONS: usize = 5;

/// Kind of collection that ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GcType {
    #[default]
    #[serde(rename = "NonConcurrentGC")]
    NonConcurrentGc,
    #[serde(rename = "BackgroundGC")]
    BackgroundGc,
    #[serde(rename = "ForegroundGC")]
    ForegroundGc,
}

impl GcType {
    pub fn as_str(self) -> &'static str {
        match self {
            GcType::NonConcurrentGc => "NonConcurrentGC",
            GcType::BackgroundGc => "BackgroundGC",
            GcType::ForegroundGc => "ForegroundGC",
        }
    }
}

impl fmt::Display for GcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the runtime triggered the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GcReason {
    AllocSmall,
    Induced,
    LowMemory,
    Empty,
    AllocLarge,
    #[serde(rename = "OutOfSpaceSOH")]
    OutOfSpaceSoh,
    #[serde(rename = "OutOfSpaceLOH")]
    OutOfSpaceLoh,
    InducedNotForced,
    Internal,
    InducedLowMemory,
    InducedCompacting,
    LowMemoryHost,
    #[serde(rename = "PMFullGC")]
    PmFullGc,
    LowMemoryHostBlocking,
    #[default]
    #[serde(other)]
    Unknown,
}

impl GcReason {
    pub fn as_str(self) -> &'static str {
        match self {
            GcReason::AllocSmall => "AllocSmall",
            GcReason::Induced => "Induced",
            GcReason::LowMemory => "LowMemory",
            GcReason::Empty => "Empty",
            GcReason::AllocLarge => "AllocLarge",
            GcReason::OutOfSpaceSoh => "OutOfSpaceSOH",
            GcReason::OutOfSpaceLoh => "OutOfSpaceLOH",
            GcReason::InducedNotForced => "InducedNotForced",
            GcReason::Internal => "Internal",
            GcReason::InducedLowMemory => "InducedLowMemory",
            GcReason::InducedCompacting => "InducedCompacting",
            GcReason::LowMemoryHost => "LowMemoryHost",
            GcReason::PmFullGc => "PMFullGC",
            GcReason::LowMemoryHostBlocking => "LowMemoryHostBlocking",
            GcReason::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for GcReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generations that carry per-generation size/survival/fragmentation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    Gen0,
    Gen1,
    Gen2,
    /// Large object heap.
    Loh,
}

impl Generation {
    pub const ALL: [Generation; 4] = [
        Generation::Gen0,
        Generation::Gen1,
        Generation::Gen2,
        Generation::Loh,
    ];

    pub fn index(self) -> usize {
        match self {
            Generation::Gen0 => 0,
            Generation::Gen1 => 1,
            Generation::Gen2 => 2,
            Generation::Loh => 3,
        }
    }

    /// Lowercase label used in column names (`gen0`, ..., `loh`).
    pub fn label(self) -> &'static str {
        match self {
            Generation::Gen0 => "gen0",
            Generation::Gen1 => "gen1",
            Generation::Gen2 => "gen2",
            Generation::Loh => "loh",
        }
    }
}

/// Per-generation measurements taken at the end of the collection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationStats {
    pub size_after_mb: f64,
    pub survival_percent: f64,
    pub fragmentation_percent: f64,
}

/// Heap statistics reported with the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapStats {
    pub total_heap_size: u64,
    /// Sizes of gen0..gen4 in bytes.
    pub generation_sizes: [u64; HEAP_GENERATIONS],
    pub gc_handle_count: u64,
    pub pinned_object_count: u64,
    pub finalization_promoted_size: u64,
}

/// Summary metrics of one finished garbage collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcEvent {
    /// Run number of the collection within the process.
    pub number: u64,
    pub generation: u32,
    #[serde(rename = "type")]
    pub gc_type: GcType,
    pub reason: GcReason,
    pub pause_duration_msec: f64,
    pub suspend_duration_msec: f64,
    pub pause_time_percentage_since_last_gc: f64,
    pub duration_since_last_restart_msec: f64,
    /// Bytes (in MB) allocated by user code per generation since the last GC.
    pub user_allocated_mb: Vec<f64>,
    pub heap_size_peak_mb: f64,
    pub heap_size_after_mb: f64,
    pub promoted_mb: f64,
    pub heap_count: u32,
    /// Ordered gen0, gen1, gen2, LOH.
    pub generations: Vec<GenerationStats>,
    pub heap_stats: HeapStats,
}

impl GcEvent {
    /// User allocations for `generation`, if the record carries them.
    pub fn user_allocated(&self, generation: Generation) -> Option<f64> {
        self.user_allocated_mb.get(generation.index()).copied()
    }

    pub fn generation_stats(&self, generation: Generation) -> Option<&GenerationStats> {
        self.generations.get(generation.index())
    }
}

/// One line of the newline-delimited JSON trace feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    pub gc: GcEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_parses_clr_names() {
        let line = r#"{"pid":4242,"process_name":"api","gc":{"number":430,"generation":0,"type":"NonConcurrentGC","reason":"AllocSmall","pause_duration_msec":7.38}}"#;
        let record: TraceRecord = serde_json::from_str(line).unwrap();

        assert_eq!(record.pid, 4242);
        assert_eq!(record.process_name.as_deref(), Some("api"));
        assert_eq!(record.gc.number, 430);
        assert_eq!(record.gc.gc_type, GcType::NonConcurrentGc);
        assert_eq!(record.gc.reason, GcReason::AllocSmall);
        assert!((record.gc.pause_duration_msec - 7.38).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_reason_maps_to_unknown() {
        let gc: GcEvent = serde_json::from_str(r#"{"reason":"SomethingNew"}"#).unwrap();
        assert_eq!(gc.reason, GcReason::Unknown);
    }

    #[test]
    fn test_missing_fields_default() {
        let gc: GcEvent = serde_json::from_str("{}").unwrap();
        assert_eq!(gc, GcEvent::default());
        assert_eq!(gc.user_allocated(Generation::Gen0), None);
        assert!(gc.generation_stats(Generation::Loh).is_none());
    }

    #[test]
    fn test_renamed_variants_round_trip_names() {
        assert_eq!(GcReason::OutOfSpaceLoh.to_string(), "OutOfSpaceLOH");
        assert_eq!(GcReason::PmFullGc.to_string(), "PMFullGC");
        assert_eq!(GcType::BackgroundGc.to_string(), "BackgroundGC");

        let json = serde_json::to_string(&GcReason::OutOfSpaceSoh).unwrap();
        assert_eq!(json, "\"OutOfSpaceSOH\"");
    }
}
