use serde::{Deserialize, Serialize};

/// `risk_pipeline` config section (§6, §4.6, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_max_positions_per_symbol")]
    pub max_positions_per_symbol: usize,
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
    #[serde(default = "default_drawdown_window_minutes")]
    pub drawdown_window_minutes: i64,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    #[serde(default = "default_correlation_reject_threshold")]
    pub correlation_reject_threshold: f64,
    #[serde(default = "default_correlation_warn_threshold")]
    pub correlation_warn_threshold: f64,
    #[serde(default = "default_max_risk_per_trade_pct")]
    pub max_risk_per_trade_pct: f64,
    #[serde(default = "default_max_symbol_exposure_pct")]
    pub max_symbol_exposure_pct: f64,
    #[serde(default = "default_min_cooldown_seconds_per_symbol")]
    pub min_cooldown_seconds_per_symbol: i64,
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,
    #[serde(default = "default_min_lot")]
    pub min_lot: f64,
    #[serde(default = "default_max_lot")]
    pub max_lot: f64,
    #[serde(default = "default_lot_step")]
    pub lot_step: f64,
}

fn default_max_positions() -> usize { 5 }
fn default_max_positions_per_symbol() -> usize { 3 }
fn default_daily_loss_limit_pct() -> f64 { 5.0 }
fn default_drawdown_window_minutes() -> i64 { 240 }
fn default_max_drawdown_pct() -> f64 { 12.0 }
// §4.6 names the 0.9 reject line literally in prose; §6's exhaustive config
// table exposes only `max_correlation_risk` (default 0.6), which this crate
// treats as the warn-tier threshold since no separate reject key is listed.
fn default_correlation_reject_threshold() -> f64 { 0.9 }
fn default_correlation_warn_threshold() -> f64 { 0.6 }
fn default_max_risk_per_trade_pct() -> f64 { 1.0 }
fn default_max_symbol_exposure_pct() -> f64 { 3.0 }
fn default_min_cooldown_seconds_per_symbol() -> i64 { 30 }
fn default_contract_size() -> f64 { 100_000.0 }
fn default_min_lot() -> f64 { 0.01 }
fn default_max_lot() -> f64 { 100.0 }
fn default_lot_step() -> f64 { 0.01 }

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            max_positions_per_symbol: default_max_positions_per_symbol(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            drawdown_window_minutes: default_drawdown_window_minutes(),
            max_drawdown_pct: default_max_drawdown_pct(),
            correlation_reject_threshold: default_correlation_reject_threshold(),
            correlation_warn_threshold: default_correlation_warn_threshold(),
            max_risk_per_trade_pct: default_max_risk_per_trade_pct(),
            max_symbol_exposure_pct: default_max_symbol_exposure_pct(),
            min_cooldown_seconds_per_symbol: default_min_cooldown_seconds_per_symbol(),
            contract_size: default_contract_size(),
            min_lot: default_min_lot(),
            max_lot: default_max_lot(),
            lot_step: default_lot_step(),
        }
    }
}
