use thiserror::Error;

/// Errors raised by pattern detectors (§4.1, §7 input validation).
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("invalid bar data: {0}")]
    InvalidBar(String),
}

/// Errors raised by the Detector Pool / Work Scheduler (§4.4, §5).
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("task validation failed: {0}")]
    InvalidTask(String),
    #[error("queue full")]
    QueueFull,
    #[error("task timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("task failed after {retries} retries: {reason}")]
    PermanentFailure { retries: u32, reason: String },
}

/// Errors raised by the Risk Pipeline (§4.6) that are genuine failures, as
/// opposed to policy rejections (which are ordinary `RiskDecision` values).
#[derive(Error, Debug)]
pub enum RiskError {
    #[error("invalid sizing input: {0}")]
    InvalidInput(String),
}

/// Errors raised by the Execution Router (§4.8).
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("broker error: {0}")]
    Broker(String),
    #[error("order timed out")]
    TimedOut,
    #[error("snapshot persistence error: {0}")]
    Snapshot(#[from] std::io::Error),
}
