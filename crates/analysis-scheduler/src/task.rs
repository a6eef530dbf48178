use std::collections::HashSet;
use std::sync::Arc;

use ict_core::{Bar, PatternKind, SchedulerError, Timeframe};

#[derive(Debug, Clone)]
pub struct AnalysisTask {
    pub id: u64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Arc<Vec<Bar>>,
    pub priority: u8,
    pub kind_filter: HashSet<PatternKind>,
}

impl AnalysisTask {
    pub fn stream_key(&self) -> (String, Timeframe) {
        (self.symbol.clone(), self.timeframe)
    }
}

pub const DEFAULT_MIN_BARS: usize = 50;

/// Validate a task at submission time (§4.4). Rejection is a hard error
/// returned synchronously to the submitter, never silently dropped.
pub fn validate_task(task: &AnalysisTask, min_bars: usize) -> Result<(), SchedulerError> {
    if task.bars.is_empty() {
        return Err(SchedulerError::InvalidTask("empty bars".to_string()));
    }
    if task.bars.len() < min_bars {
        return Err(SchedulerError::InvalidTask(format!(
            "fewer than {min_bars} bars (got {})",
            task.bars.len()
        )));
    }
    for b in task.bars.iter() {
        if b.high < b.low || b.close < b.low || b.close > b.high {
            return Err(SchedulerError::InvalidTask(format!(
                "bar at {} has inconsistent OHLC",
                b.timestamp
            )));
        }
    }
    Ok(())
}

/// Estimated processing time for a task, derived from bar count and the
/// per-timeframe multiplier (§4.4).
pub fn estimate_time(task: &AnalysisTask) -> f64 {
    task.bars.len() as f64 * task.timeframe.estimate_time_multiplier()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open: 1.1,
                high: 1.11,
                low: 1.09,
                close: 1.1,
                volume: 1.0,
            })
            .collect()
    }

    fn task(bars: Vec<Bar>) -> AnalysisTask {
        AnalysisTask {
            id: 1,
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M15,
            bars: Arc::new(bars),
            priority: 0,
            kind_filter: HashSet::new(),
        }
    }

    #[test]
    fn rejects_empty_bars() {
        assert!(validate_task(&task(Vec::new()), DEFAULT_MIN_BARS).is_err());
    }

    #[test]
    fn rejects_below_min_bars() {
        assert!(validate_task(&task(bars(10)), DEFAULT_MIN_BARS).is_err());
    }

    #[test]
    fn rejects_inconsistent_ohlc() {
        let mut b = bars(60);
        b[0].close = 5.0;
        assert!(validate_task(&task(b), DEFAULT_MIN_BARS).is_err());
    }

    #[test]
    fn accepts_well_formed_task() {
        assert!(validate_task(&task(bars(60)), DEFAULT_MIN_BARS).is_ok());
    }
}
