use ict_core::PatternKind;

use crate::task::AnalysisTask;
use crate::worker::WorkerState;

/// Score candidate (task, worker); lower is better (§4.4).
///
/// `0.4*current_load + (-0.3 if kind in specialties else 0)
///   + 0.2*(2 - perf_score) + 0.1*estimated_time/avg_task_time`
fn score(worker: &WorkerState, task: &AnalysisTask, estimated_time: f64, avg_task_time: f64) -> f64 {
    let specialty_bonus = if task.kind_filter.iter().any(|k| worker.specialties.contains(k)) {
        -0.3
    } else {
        0.0
    };
    let avg = if avg_task_time > 0.0 { avg_task_time } else { 1.0 };
    0.4 * worker.current_load + specialty_bonus + 0.2 * (2.0 - worker.perf_score) + 0.1 * estimated_time / avg
}

/// Choose the lowest-scoring worker for `task`. Returns the worker index.
pub fn choose_worker(
    workers: &[WorkerState],
    task: &AnalysisTask,
    estimated_time: f64,
    avg_task_time: f64,
) -> Option<usize> {
    workers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            score(a, task, estimated_time, avg_task_time)
                .partial_cmp(&score(b, task, estimated_time, avg_task_time))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
}

/// Imbalance check: if the most-loaded worker exceeds the least-loaded by
/// more than 50%, return `(overloaded, underloaded)` indices for migration
/// (§4.4). A zero or near-zero least load never triggers migration.
pub fn find_imbalance(workers: &[WorkerState]) -> Option<(usize, usize)> {
    if workers.len() < 2 {
        return None;
    }
    let (max_idx, max_load) = workers
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.current_load.partial_cmp(&b.current_load).unwrap())
        .map(|(i, w)| (i, w.current_load))?;
    let (min_idx, min_load) = workers
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.current_load.partial_cmp(&b.current_load).unwrap())
        .map(|(i, w)| (i, w.current_load))?;

    if min_load <= 0.0 {
        return None;
    }
    if max_load > min_load * 1.5 {
        Some((max_idx, min_idx))
    } else {
        None
    }
}

pub fn worker_wants(worker: &WorkerState, kind: PatternKind) -> bool {
    worker.specialties.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn task_with_filter(kinds: &[PatternKind]) -> AnalysisTask {
        AnalysisTask {
            id: 1,
            symbol: "EURUSD".to_string(),
            timeframe: ict_core::Timeframe::M15,
            bars: Arc::new(Vec::new()),
            priority: 0,
            kind_filter: kinds.iter().copied().collect(),
        }
    }

    /// Literal scenario from §8: two workers, W0 {BOS,CHoCH}, W1 {FVG,OB};
    /// task kind_filter={FVG} -> W1 chosen.
    #[test]
    fn specialty_bonus_dominates_absent_load_differences() {
        let w0 = WorkerState::new(0, HashSet::from([PatternKind::Bos, PatternKind::Choch]));
        let w1 = WorkerState::new(1, HashSet::from([PatternKind::Fvg, PatternKind::OrderBlock]));
        let workers = vec![w0, w1];
        let task = task_with_filter(&[PatternKind::Fvg]);
        let chosen = choose_worker(&workers, &task, 60.0, 60.0).unwrap();
        assert_eq!(chosen, 1);
    }

    #[test]
    fn imbalance_detected_above_fifty_percent() {
        let mut w0 = WorkerState::new(0, HashSet::new());
        w0.current_load = 100.0;
        let mut w1 = WorkerState::new(1, HashSet::new());
        w1.current_load = 50.0;
        let (overloaded, underloaded) = find_imbalance(&[w0, w1]).unwrap();
        assert_eq!(overloaded, 0);
        assert_eq!(underloaded, 1);
    }

    #[test]
    fn no_imbalance_within_fifty_percent() {
        let mut w0 = WorkerState::new(0, HashSet::new());
        w0.current_load = 120.0;
        let mut w1 = WorkerState::new(1, HashSet::new());
        w1.current_load = 100.0;
        assert!(find_imbalance(&[w0, w1]).is_none());
    }
}
