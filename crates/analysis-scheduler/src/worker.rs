use std::collections::HashSet;

use ict_core::PatternKind;

#[derive(Debug, Clone)]
pub struct WorkerState {
    pub id: usize,
    pub specialties: HashSet<PatternKind>,
    pub current_load: f64,
    /// `perf_score` in `[0, 2]`; higher is better. Starts neutral at 1.0 and
    /// is nudged by completed-task outcomes (see `pool.rs`).
    pub perf_score: f64,
}

impl WorkerState {
    pub fn new(id: usize, specialties: HashSet<PatternKind>) -> Self {
        Self {
            id,
            specialties,
            current_load: 0.0,
            perf_score: 1.0,
        }
    }
}

/// Assign two specialties per worker, round-robin over the six pattern
/// kinds, as required at startup (§4.4).
pub fn round_robin_specialties(worker_count: usize) -> Vec<HashSet<PatternKind>> {
    use PatternKind::*;
    let kinds = [Fvg, OrderBlock, Bos, Choch, LiquidityPool, Displacement];
    let mut specialties: Vec<HashSet<PatternKind>> = (0..worker_count).map(|_| HashSet::new()).collect();
    if worker_count == 0 {
        return specialties;
    }
    for (i, kind) in kinds.iter().enumerate() {
        specialties[i % worker_count].insert(*kind);
    }
    specialties
}

/// Pool size = `min(configured_size, logical_cpus * 0.75)` (§4.4).
pub fn pool_size(configured_size: usize, logical_cpus: usize) -> usize {
    configured_size.min(((logical_cpus as f64) * 0.75).floor().max(1.0) as usize)
}
