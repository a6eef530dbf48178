use std::collections::HashMap;

use ict_core::PatternKind;
use serde::{Deserialize, Serialize};

/// `memory` config section (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
    #[serde(default = "default_time_decay_factor")]
    pub time_decay_factor: f64,
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: i64,
    #[serde(default = "default_weight_multipliers")]
    pub weight_multipliers: HashMap<PatternKindKey, f64>,
    #[serde(default = "default_snapshot_interval_updates")]
    pub snapshot_interval_updates: u64,
}

/// `PatternKind` is not `Hash`/`Eq` on the nose we'd want for map keys across
/// serde round-trips (string keys serialize more portably in JSON), so the
/// config table is keyed by this string-backed wrapper instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternKindKey(pub String);

impl From<PatternKind> for PatternKindKey {
    fn from(k: PatternKind) -> Self {
        PatternKindKey(k.as_str().to_string())
    }
}

fn default_min_samples() -> usize {
    5
}
fn default_success_threshold() -> f64 {
    0.7
}
fn default_time_decay_factor() -> f64 {
    0.1
}
fn default_max_lookback_days() -> i64 {
    30
}
fn default_snapshot_interval_updates() -> u64 {
    100
}

fn default_weight_multipliers() -> HashMap<PatternKindKey, f64> {
    use PatternKind::*;
    [Fvg, OrderBlock, Bos, Choch, LiquidityPool, Displacement]
        .iter()
        .map(|k| ((*k).into(), 1.0))
        .collect()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            success_threshold: default_success_threshold(),
            time_decay_factor: default_time_decay_factor(),
            max_lookback_days: default_max_lookback_days(),
            weight_multipliers: default_weight_multipliers(),
            snapshot_interval_updates: default_snapshot_interval_updates(),
        }
    }
}

impl MemoryConfig {
    pub fn cold_start_weight(&self, kind: PatternKind) -> f64 {
        self.weight_multipliers
            .get(&kind.into())
            .copied()
            .unwrap_or(1.0)
    }
}
