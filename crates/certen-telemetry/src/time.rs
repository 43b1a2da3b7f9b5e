use crate::sinks::CycleMetricsSink;
use std::time::Instant;

/// RAII timer that records its elapsed time to a `CycleMetricsSink` on drop —
/// used to bracket a full proof cycle (discovery through write-back).
pub struct Timer<'a> {
    sink: &'a dyn CycleMetricsSink,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(sink: &'a dyn CycleMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_cycle_duration(self.start.elapsed().as_secs_f64());
    }
}
