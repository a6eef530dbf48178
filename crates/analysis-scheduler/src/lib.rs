pub mod cache;
pub mod dispatch;
pub mod pool;
pub mod task;
pub mod worker;

pub use cache::SharedMemoryOptimizer;
pub use pool::{Scheduler, SchedulerConfig, TaskOutcome};
pub use task::AnalysisTask;
pub use worker::WorkerState;
