//! Shared record types for gcmon (GC completion events, trace feed lines).

pub mod event;

pub use event::{
    GcEvent, GcReason, GcType, Generation, GenerationStats, HEAP_GENERATIONS, HeapStats,
    TraceRecord,
};
