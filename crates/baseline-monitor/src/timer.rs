use std::time::Instant;

use crate::monitor::BaselineMonitor;

/// RAII span measuring one component operation's latency, grounded on the
/// original system's `ComponentTimer` context manager. Records
/// `{component}_latency_ms` on drop regardless of the guarded code path
/// (including early returns via `?`).
pub struct ComponentTimer<'a> {
    monitor: &'a BaselineMonitor,
    component: String,
    operation: String,
    started_at: Instant,
}

impl<'a> ComponentTimer<'a> {
    pub fn start(monitor: &'a BaselineMonitor, component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            monitor,
            component: component.into(),
            operation: operation.into(),
            started_at: Instant::now(),
        }
    }
}

impl Drop for ComponentTimer<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.started_at.elapsed().as_secs_f64() * 1000.0;
        self.monitor
            .record(&format!("{}_latency_ms", self.component), elapsed_ms, &self.operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorConfig;

    #[test]
    fn timer_records_on_drop() {
        let monitor = BaselineMonitor::new(MonitorConfig::default());
        {
            let _t = ComponentTimer::start(&monitor, "pattern_detector", "detect_all");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let samples = monitor.samples_for("pattern_detector_latency_ms");
        assert_eq!(samples.len(), 1);
        assert!(samples[0] >= 5.0);
    }
}
