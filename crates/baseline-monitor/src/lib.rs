pub mod monitor;
pub mod stats;
pub mod timer;

pub use monitor::{Baseline, BaselineMonitor, DeviationReport, MonitorConfig, Status};
pub use timer::ComponentTimer;
