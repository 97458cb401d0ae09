//! Core gcmon library: ingestion, live table, snapshots and the terminal
//! plumbing around them.

pub mod capture;
pub mod columns;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod filter;
pub mod ingest;
pub mod interrupt;
pub mod keyboard;
pub mod logging;
pub mod monitor;
pub mod queue;
pub mod session;
pub mod source;
pub mod terminal;

pub use monitor::{Monitor, MonitorError, MonitorHandle, MonitorOptions, RunSummary, StopReason};
