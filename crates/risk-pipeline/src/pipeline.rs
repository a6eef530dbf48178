use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use ict_core::OpenPosition;
use serde::Serialize;

use crate::config::RiskPolicy;
use crate::correlation::{max_correlation, CorrelationProvider};
use crate::sizing::calculate_position_size;

#[derive(Debug, Clone, Serialize)]
pub struct RiskDecision {
    pub approved: bool,
    pub lots: f64,
    pub risk_pct: f64,
    pub reasons: Vec<String>,
    pub stage: String,
    pub confidence: f64,
}

impl RiskDecision {
    fn rejected(stage: &str, reason: &str) -> Self {
        Self {
            approved: false,
            lots: 0.0,
            risk_pct: 0.0,
            reasons: vec![reason.to_string()],
            stage: stage.to_string(),
            confidence: 0.0,
        }
    }
}

/// A single equity observation, used to evaluate rolling drawdown.
#[derive(Debug, Clone, Copy)]
pub struct EquitySample {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Everything the pipeline needs about account and portfolio state that
/// isn't part of the signal itself.
pub struct RiskContext<'a> {
    pub open_positions: &'a [OpenPosition],
    pub day_start_balance: f64,
    pub equity: f64,
    pub equity_history: &'a [EquitySample],
    pub last_signal_at: &'a HashMap<String, DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// A candidate trade signal entering the pipeline.
pub struct TradeSignal<'a> {
    pub symbol: &'a str,
    pub account_balance: f64,
    pub risk_percent: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    /// Pattern confidence in `[0, 1]`, used by Stage 2's ICT-aware hint.
    pub pattern_confidence: f64,
}

/// Four-stage Risk Pipeline (H): hard guards, strategic adjustment,
/// position sizing, per-order fast gate — evaluated strictly in order, the
/// first failing stage returns the decision (§4.6).
pub fn evaluate(
    signal: &TradeSignal,
    ctx: &RiskContext,
    correlation_provider: &dyn CorrelationProvider,
    policy: &RiskPolicy,
) -> RiskDecision {
    if let Some(decision) = stage1_hard_guards(signal, ctx, policy) {
        return decision;
    }

    let (strategic_hint_lots, warnings) = match stage2_strategic_adjustment(signal, ctx, correlation_provider, policy) {
        Ok(v) => v,
        Err(decision) => return decision,
    };

    let sizing = match calculate_position_size(
        signal.symbol,
        signal.account_balance,
        signal.risk_percent,
        signal.entry_price,
        signal.stop_loss,
        policy,
    ) {
        Ok(s) => s,
        Err(e) => return RiskDecision::rejected("position_sizing", &e.to_string()),
    };

    let blended_lots = match strategic_hint_lots {
        Some(hint) if hint > 0.0 => (hint + sizing.lots) / 2.0,
        _ => sizing.lots,
    };

    let decision = stage4_fast_gate(signal, ctx, blended_lots, sizing.confidence, policy);
    for w in warnings {
        tracing::warn!(symbol = signal.symbol, "{w}");
    }
    decision
}

fn stage1_hard_guards(signal: &TradeSignal, ctx: &RiskContext, policy: &RiskPolicy) -> Option<RiskDecision> {
    if ctx.open_positions.len() >= policy.max_positions {
        return Some(RiskDecision::rejected("risk_guard", "MAX_POSITIONS"));
    }
    let symbol_count = ctx.open_positions.iter().filter(|p| p.symbol == signal.symbol).count();
    if symbol_count >= policy.max_positions_per_symbol {
        return Some(RiskDecision::rejected("risk_guard", "MAX_POSITIONS_PER_SYMBOL"));
    }
    let floor = ctx.day_start_balance * (1.0 - policy.daily_loss_limit_pct / 100.0);
    if ctx.equity < floor {
        return Some(RiskDecision::rejected("risk_guard", "DAILY_LOSS_LIMIT"));
    }
    if let Some(drawdown_pct) = rolling_drawdown_pct(ctx, policy.drawdown_window_minutes) {
        if drawdown_pct > policy.max_drawdown_pct {
            return Some(RiskDecision::rejected("risk_guard", "DRAWDOWN_LIMIT"));
        }
    }
    None
}

fn rolling_drawdown_pct(ctx: &RiskContext, window_minutes: i64) -> Option<f64> {
    let cutoff = ctx.now - Duration::minutes(window_minutes);
    let peak = ctx
        .equity_history
        .iter()
        .filter(|s| s.timestamp >= cutoff)
        .map(|s| s.equity)
        .fold(ctx.equity, f64::max);
    if peak <= 0.0 {
        return None;
    }
    Some((peak - ctx.equity) / peak * 100.0)
}

/// Stage 2: correlation gate plus an ICT-aware sizing hint. The hint
/// formula (pattern quality scaled by a session-liquidity factor) has no
/// literal spec formula; this is an authored extension, not a grounded one.
fn stage2_strategic_adjustment(
    signal: &TradeSignal,
    ctx: &RiskContext,
    correlation_provider: &dyn CorrelationProvider,
    policy: &RiskPolicy,
) -> Result<(Option<f64>, Vec<String>), RiskDecision> {
    let open_symbols: Vec<String> = ctx.open_positions.iter().map(|p| p.symbol.clone()).collect();
    let correlation = max_correlation(correlation_provider, signal.symbol, &open_symbols);

    if correlation >= policy.correlation_reject_threshold {
        return Err(RiskDecision::rejected("strategic_adjustment", "correlation_extreme"));
    }

    let mut warnings = Vec::new();
    if correlation >= policy.correlation_warn_threshold {
        warnings.push(format!("elevated correlation {correlation:.2} with an open position"));
    }

    let session_factor = session_liquidity_factor(ctx.now);
    let hint_risk_percent = signal.risk_percent * signal.pattern_confidence * session_factor;
    let hint_lots = if hint_risk_percent > 0.0 {
        calculate_position_size(
            signal.symbol,
            signal.account_balance,
            hint_risk_percent,
            signal.entry_price,
            signal.stop_loss,
            policy,
        )
        .ok()
        .map(|s| s.lots)
    } else {
        None
    };

    Ok((hint_lots, warnings))
}

/// London/New York overlap (roughly 12:00-16:00 UTC) gets a liquidity
/// bonus; the Asia-only session (22:00-00:00 UTC) gets a discount.
fn session_liquidity_factor(now: DateTime<Utc>) -> f64 {
    use chrono::Timelike;
    let hour = now.hour();
    if (12..16).contains(&hour) {
        1.2
    } else if (22..24).contains(&hour) {
        0.8
    } else {
        1.0
    }
}

fn stage4_fast_gate(
    signal: &TradeSignal,
    ctx: &RiskContext,
    lots: f64,
    confidence: f64,
    policy: &RiskPolicy,
) -> RiskDecision {
    if signal.risk_percent <= 0.0 {
        return RiskDecision::rejected("per_order_gate", "RISK_PCT_NOT_POSITIVE");
    }
    if signal.risk_percent > policy.max_risk_per_trade_pct {
        return RiskDecision::rejected("per_order_gate", "RISK_PCT_EXCEEDS_MAX");
    }

    let current_exposure_pct: f64 = ctx
        .open_positions
        .iter()
        .filter(|p| p.symbol == signal.symbol)
        .map(|p| p.volume * policy.contract_size * signal.entry_price)
        .sum::<f64>()
        / signal.account_balance
        * 100.0;
    let added_exposure_pct = lots * policy.contract_size * signal.entry_price / signal.account_balance * 100.0;
    if current_exposure_pct + added_exposure_pct > policy.max_symbol_exposure_pct {
        return RiskDecision::rejected("per_order_gate", "SYMBOL_EXPOSURE_LIMIT");
    }

    if let Some(last) = ctx.last_signal_at.get(signal.symbol) {
        let elapsed = (ctx.now - *last).num_seconds();
        if elapsed < policy.min_cooldown_seconds_per_symbol {
            return RiskDecision::rejected("per_order_gate", "COOLDOWN_ACTIVE");
        }
    }

    RiskDecision {
        approved: true,
        lots,
        risk_pct: signal.risk_percent,
        reasons: Vec::new(),
        stage: "approved".to_string(),
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::StaticCorrelationMatrix;
    use ict_core::Direction;

    fn base_ctx<'a>(
        open_positions: &'a [OpenPosition],
        equity_history: &'a [EquitySample],
        last_signal_at: &'a HashMap<String, DateTime<Utc>>,
    ) -> RiskContext<'a> {
        RiskContext {
            open_positions,
            day_start_balance: 10000.0,
            equity: 10000.0,
            equity_history,
            last_signal_at,
            now: Utc::now(),
        }
    }

    /// Literal scenario from §8: day_start_balance=10000, equity=9400,
    /// max_daily_loss_pct=5.0 -> rejected with DAILY_LOSS_LIMIT at risk_guard.
    #[test]
    fn daily_loss_limit_rejects_at_stage_one() {
        let policy = RiskPolicy::default();
        let provider = StaticCorrelationMatrix::default();
        let open_positions: Vec<OpenPosition> = Vec::new();
        let equity_history: Vec<EquitySample> = Vec::new();
        let last_signal_at = HashMap::new();
        let mut ctx = base_ctx(&open_positions, &equity_history, &last_signal_at);
        ctx.equity = 9400.0;

        let signal = TradeSignal {
            symbol: "EURUSD",
            account_balance: 10000.0,
            risk_percent: 1.0,
            entry_price: 1.1000,
            stop_loss: 1.0950,
            pattern_confidence: 0.8,
        };

        let decision = evaluate(&signal, &ctx, &provider, &policy);
        assert!(!decision.approved);
        assert_eq!(decision.stage, "risk_guard");
        assert_eq!(decision.reasons, vec!["DAILY_LOSS_LIMIT".to_string()]);
    }

    #[test]
    fn well_formed_signal_is_approved() {
        let policy = RiskPolicy::default();
        let provider = StaticCorrelationMatrix::default();
        let open_positions: Vec<OpenPosition> = Vec::new();
        let equity_history: Vec<EquitySample> = Vec::new();
        let last_signal_at = HashMap::new();
        let ctx = base_ctx(&open_positions, &equity_history, &last_signal_at);

        let signal = TradeSignal {
            symbol: "EURUSD",
            account_balance: 10000.0,
            risk_percent: 1.0,
            entry_price: 1.1000,
            stop_loss: 1.0950,
            pattern_confidence: 0.8,
        };

        let decision = evaluate(&signal, &ctx, &provider, &policy);
        assert!(decision.approved);
        assert_eq!(decision.stage, "approved");
        assert!(decision.lots > 0.0);
    }

    #[test]
    fn extreme_correlation_rejects_at_stage_two() {
        let policy = RiskPolicy::default();
        let provider = StaticCorrelationMatrix::default();
        let open_positions = vec![OpenPosition {
            ticket: "1".to_string(),
            symbol: "USDCHF".to_string(),
            volume: 0.1,
            direction: Direction::Bullish,
            entry_price: 0.9,
            stop_loss: None,
            take_profit: None,
            opened_at: Utc::now(),
        }];
        let equity_history: Vec<EquitySample> = Vec::new();
        let last_signal_at = HashMap::new();
        let ctx = base_ctx(&open_positions, &equity_history, &last_signal_at);

        let signal = TradeSignal {
            symbol: "EURUSD",
            account_balance: 10000.0,
            risk_percent: 1.0,
            entry_price: 1.1000,
            stop_loss: 1.0950,
            pattern_confidence: 0.8,
        };

        let decision = evaluate(&signal, &ctx, &provider, &policy);
        assert!(!decision.approved);
        assert_eq!(decision.stage, "strategic_adjustment");
        assert_eq!(decision.reasons, vec!["correlation_extreme".to_string()]);
    }

    #[test]
    fn cooldown_rejects_at_fast_gate() {
        let policy = RiskPolicy::default();
        let provider = StaticCorrelationMatrix::default();
        let open_positions: Vec<OpenPosition> = Vec::new();
        let equity_history: Vec<EquitySample> = Vec::new();
        let mut last_signal_at = HashMap::new();
        let now = Utc::now();
        last_signal_at.insert("EURUSD".to_string(), now - Duration::seconds(5));
        let mut ctx = base_ctx(&open_positions, &equity_history, &last_signal_at);
        ctx.now = now;

        let signal = TradeSignal {
            symbol: "EURUSD",
            account_balance: 10000.0,
            risk_percent: 1.0,
            entry_price: 1.1000,
            stop_loss: 1.0950,
            pattern_confidence: 0.8,
        };

        let decision = evaluate(&signal, &ctx, &provider, &policy);
        assert!(!decision.approved);
        assert_eq!(decision.stage, "per_order_gate");
        assert_eq!(decision.reasons, vec!["COOLDOWN_ACTIVE".to_string()]);
    }
}
