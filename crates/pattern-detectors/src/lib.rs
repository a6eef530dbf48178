pub mod config;
pub mod displacement;
pub mod fvg;
pub mod liquidity;
pub mod order_block;
pub mod structure;
pub mod swing;

pub use config::PatternDetectorConfig;

use std::collections::{HashMap, HashSet};

use ict_core::{Bar, DetectorError, Pattern, PatternKind, Timeframe};

/// Run every detector over the given window and return the union of all
/// candidate patterns. Each detector is a free function taking an immutable
/// bar window (design note: replace dynamic dispatch with a tagged union
/// and a dispatch table keyed by variant).
///
/// Identical price zones from different detectors are reported separately —
/// merging happens at the orchestrator layer, not here (§4.1 tie-breaking).
pub fn detect_all(
    bars: &[Bar],
    symbol: &str,
    timeframe: Timeframe,
    kind_filter: Option<&HashSet<PatternKind>>,
    cfg: &PatternDetectorConfig,
) -> Result<Vec<Pattern>, DetectorError> {
    if bars.is_empty() {
        return Err(DetectorError::InsufficientData(
            "empty bar window".to_string(),
        ));
    }
    if bars.len() < cfg.min_window {
        return Ok(Vec::new());
    }
    for b in bars {
        if b.high < b.low || b.close < b.low || b.close > b.high {
            return Err(DetectorError::InvalidBar(format!(
                "bar at {} has inconsistent OHLC",
                b.timestamp
            )));
        }
    }

    let wants = |k: PatternKind| kind_filter.map(|f| f.contains(&k)).unwrap_or(true);
    let mut out = Vec::new();

    if wants(PatternKind::Fvg) {
        out.extend(fvg::detect_fvg(bars, symbol, timeframe, cfg));
    }
    if wants(PatternKind::OrderBlock) {
        out.extend(order_block::detect_order_blocks(bars, symbol, timeframe, cfg));
    }
    if wants(PatternKind::Bos) || wants(PatternKind::Choch) {
        out.extend(
            structure::detect_structure(bars, symbol, timeframe, cfg)
                .into_iter()
                .filter(|p| wants(p.kind())),
        );
    }
    if wants(PatternKind::LiquidityPool) {
        out.extend(liquidity::detect_liquidity_pools(bars, symbol, timeframe, cfg));
    }
    if wants(PatternKind::Displacement) {
        out.extend(displacement::detect_displacement(bars, symbol, timeframe, cfg));
    }

    Ok(out)
}

/// Deduplicate by (symbol, timeframe, kind, rounded zone, origin bar index),
/// as required when the same window is re-analyzed and overlapping results
/// are merged (§4.1).
pub fn dedup_patterns(patterns: Vec<Pattern>) -> Vec<Pattern> {
    let mut seen: HashMap<(String, Timeframe, PatternKind, i64, i64, usize), ()> = HashMap::new();
    let mut out = Vec::new();
    for pattern in patterns {
        let common = pattern.common();
        let key = (
            common.symbol.clone(),
            common.timeframe,
            pattern.kind(),
            (common.price_zone.low * 1e5).round() as i64,
            (common.price_zone.high * 1e5).round() as i64,
            common.origin_bar_index,
        );
        if seen.insert(key, ()).is_none() {
            out.push(pattern);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open: 1.1000,
                high: 1.1005,
                low: 1.0995,
                close: 1.1002,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn empty_bars_is_an_error() {
        let result = detect_all(&[], "EURUSD", Timeframe::M15, None, &PatternDetectorConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn below_min_window_returns_empty_ok() {
        let result = detect_all(&bars(10), "EURUSD", Timeframe::M15, None, &PatternDetectorConfig::default());
        assert_eq!(result.unwrap().len(), 0);
    }

    #[test]
    fn invalid_bar_is_rejected() {
        let mut b = bars(60);
        b[5].close = 2.0; // outside [low, high]
        let result = detect_all(&b, "EURUSD", Timeframe::M15, None, &PatternDetectorConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn kind_filter_restricts_output() {
        let mut filter = HashSet::new();
        filter.insert(PatternKind::Fvg);
        let result = detect_all(&bars(60), "EURUSD", Timeframe::M15, Some(&filter), &PatternDetectorConfig::default())
            .unwrap();
        assert!(result.iter().all(|p| p.kind() == PatternKind::Fvg));
    }
}
