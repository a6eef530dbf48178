use serde::{Deserialize, Serialize};

/// `pattern_detectors` config section (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDetectorConfig {
    #[serde(default = "default_min_gap_pips")]
    pub min_gap_pips: f64,
    #[serde(default = "default_ob_impulse_multiplier")]
    pub ob_impulse_multiplier: f64,
    #[serde(default = "default_swing_window")]
    pub swing_window: usize,
    #[serde(default = "default_liquidity_tolerance_pips")]
    pub liquidity_tolerance_pips: f64,
    #[serde(default = "default_min_window")]
    pub min_window: usize,
}

fn default_min_gap_pips() -> f64 {
    3.0
}
fn default_ob_impulse_multiplier() -> f64 {
    1.5
}
fn default_swing_window() -> usize {
    5
}
fn default_liquidity_tolerance_pips() -> f64 {
    5.0
}
fn default_min_window() -> usize {
    50
}

impl Default for PatternDetectorConfig {
    fn default() -> Self {
        Self {
            min_gap_pips: default_min_gap_pips(),
            ob_impulse_multiplier: default_ob_impulse_multiplier(),
            swing_window: default_swing_window(),
            liquidity_tolerance_pips: default_liquidity_tolerance_pips(),
            min_window: default_min_window(),
        }
    }
}
