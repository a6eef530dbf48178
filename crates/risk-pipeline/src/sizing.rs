use ict_core::{pip_size, RiskError};

use crate::config::RiskPolicy;

/// Position sizing result (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct PositionSizeResult {
    pub lots: f64,
    pub stop_distance_pips: f64,
    pub risk_amount: f64,
    pub pip_value_per_lot: f64,
    pub confidence: f64,
    pub is_valid: bool,
}

/// Compute a risk-based lot size for a symbol (§4.7, steps 1-6).
pub fn calculate_position_size(
    symbol: &str,
    account_balance: f64,
    risk_percent: f64,
    entry_price: f64,
    stop_loss: f64,
    policy: &RiskPolicy,
) -> Result<PositionSizeResult, RiskError> {
    if account_balance <= 0.0 {
        return Err(RiskError::InvalidInput("account_balance must be positive".to_string()));
    }
    if risk_percent <= 0.0 {
        return Err(RiskError::InvalidInput("risk_percent must be positive".to_string()));
    }
    if entry_price == stop_loss {
        return Err(RiskError::InvalidInput("entry_price and stop_loss must differ".to_string()));
    }

    let pip = pip_size(symbol);
    let stop_distance_pips = (entry_price - stop_loss).abs() / pip;
    let risk_amount = account_balance * risk_percent / 100.0;
    let pip_value_per_lot = pip * policy.contract_size;

    let raw_lots = risk_amount / (stop_distance_pips * pip_value_per_lot);
    let stepped = round_to_step(raw_lots, policy.lot_step);
    let lots = stepped.clamp(policy.min_lot, policy.max_lot);

    let mut confidence: f64 = 1.0;
    if risk_amount / account_balance > 0.02 {
        confidence -= 0.2;
    }
    if lots > 5.0 {
        confidence -= 0.1;
    }
    if risk_percent > 1.5 {
        confidence -= 0.15;
    }
    confidence = confidence.max(0.1);

    Ok(PositionSizeResult {
        lots,
        stop_distance_pips,
        risk_amount,
        pip_value_per_lot,
        confidence,
        is_valid: lots > 0.0,
    })
}

fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Literal scenario from §8: EURUSD, balance=10000, risk=1%,
    /// entry=1.1000, stop=1.0950 -> lots=0.20.
    #[test]
    fn standard_case_matches_worked_example() {
        let policy = RiskPolicy::default();
        let result =
            calculate_position_size("EURUSD", 10000.0, 1.0, 1.1000, 1.0950, &policy).unwrap();
        assert_relative_eq!(result.stop_distance_pips, 50.0, epsilon = 1e-6);
        assert_relative_eq!(result.risk_amount, 100.0, epsilon = 1e-6);
        assert_relative_eq!(result.pip_value_per_lot, 10.0, epsilon = 1e-6);
        assert_relative_eq!(result.lots, 0.20, epsilon = 1e-6);
        assert!(result.is_valid);
        assert_relative_eq!(result.confidence, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn jpy_pair_uses_the_wider_pip_size() {
        let policy = RiskPolicy::default();
        let result =
            calculate_position_size("USDJPY", 10000.0, 1.0, 150.00, 149.50, &policy).unwrap();
        assert_relative_eq!(result.stop_distance_pips, 50.0, epsilon = 1e-6);
    }

    #[test]
    fn large_lots_and_high_risk_percent_lower_confidence() {
        let policy = RiskPolicy::default();
        let result =
            calculate_position_size("EURUSD", 1_000_000.0, 2.0, 1.1000, 1.0990, &policy).unwrap();
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn equal_entry_and_stop_is_rejected() {
        let policy = RiskPolicy::default();
        assert!(calculate_position_size("EURUSD", 10000.0, 1.0, 1.1000, 1.1000, &policy).is_err());
    }
}
