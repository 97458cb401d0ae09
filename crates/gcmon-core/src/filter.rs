use gcmon_types::GcEvent;

/// Decides whether a GC completion record is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventFilter {
    min_pause_msec: Option<f64>,
}

impl EventFilter {
    pub fn new(min_pause_msec: Option<f64>) -> Self {
        Self { min_pause_msec }
    }

    pub fn min_pause_msec(&self) -> Option<f64> {
        self.min_pause_msec
    }

    /// Accepts everything without a threshold; otherwise only pauses
    /// strictly longer than it.
    pub fn accept(&self, gc: &GcEvent) -> bool {
        self.min_pause_msec.is_none_or(|min| gc.pause_duration_msec > min)
    }
}
