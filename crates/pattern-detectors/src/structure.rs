use std::collections::HashSet;

use ict_core::{Bar, Direction, Pattern, PatternCommon, PatternStatus, PriceZone, StructureBreakDetail, Timeframe};

use crate::config::PatternDetectorConfig;
use crate::swing::{SwingKind, detect_swings};

/// BOS/CHoCH detector (§4.1.3). Maintains a running swing-point series and
/// classifies each break of a prior swing as either a continuation (BOS, in
/// the direction of the prevailing trend) or a reversal (CHoCH, against it).
pub fn detect_structure(
    bars: &[Bar],
    symbol: &str,
    timeframe: Timeframe,
    cfg: &PatternDetectorConfig,
) -> Vec<Pattern> {
    let mut out = Vec::new();
    let arena = detect_swings(bars, cfg.swing_window);
    if bars.is_empty() {
        return out;
    }

    let mut trend: Option<Direction> = None;
    let mut broken: HashSet<u64> = HashSet::new();
    let last_index = bars.len() - 1;

    for i in 0..bars.len() {
        // Most recent confirmed swing high/low strictly before this bar.
        let last_high = arena
            .iter()
            .filter(|s| s.kind == SwingKind::High && s.bar_index < i && !broken.contains(&s.id))
            .max_by_key(|s| s.bar_index);
        let last_low = arena
            .iter()
            .filter(|s| s.kind == SwingKind::Low && s.bar_index < i && !broken.contains(&s.id))
            .max_by_key(|s| s.bar_index);

        let close = bars[i].close;

        if let Some(swing) = last_high {
            if close > swing.price {
                let is_bos = matches!(trend, Some(Direction::Bullish)) || trend.is_none();
                out.push(build_break(
                    symbol,
                    timeframe,
                    Direction::Bullish,
                    i,
                    bars[i].timestamp,
                    swing.price,
                    swing.id,
                    is_bos,
                    i == last_index,
                ));
                trend = Some(Direction::Bullish);
                broken.insert(swing.id);
            }
        }

        if let Some(swing) = last_low {
            if close < swing.price {
                let is_bos = matches!(trend, Some(Direction::Bearish)) || trend.is_none();
                out.push(build_break(
                    symbol,
                    timeframe,
                    Direction::Bearish,
                    i,
                    bars[i].timestamp,
                    swing.price,
                    swing.id,
                    is_bos,
                    i == last_index,
                ));
                trend = Some(Direction::Bearish);
                broken.insert(swing.id);
            }
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn build_break(
    symbol: &str,
    timeframe: Timeframe,
    direction: Direction,
    origin_bar_index: usize,
    detected_at: chrono::DateTime<chrono::Utc>,
    break_level: f64,
    prior_structure_ref: u64,
    is_bos: bool,
    just_formed: bool,
) -> Pattern {
    let (low, high) = if direction == Direction::Bullish {
        (break_level, break_level + break_level.abs().max(1e-6) * 0.0001)
    } else {
        (break_level - break_level.abs().max(1e-6) * 0.0001, break_level)
    };
    let common = PatternCommon {
        id: 0,
        symbol: symbol.to_string(),
        timeframe,
        direction,
        detected_at,
        origin_bar_index,
        price_zone: PriceZone::new(low, high),
        base_score: if is_bos { 65.0 } else { 75.0 },
        base_confidence: if is_bos { 0.6 } else { 0.7 },
        enhanced_confidence: if is_bos { 0.6 } else { 0.7 },
        status: PatternStatus::Active,
        confluences: HashSet::new(),
        just_formed,
    };
    let detail = StructureBreakDetail {
        break_level,
        prior_structure_ref,
    };
    if is_bos {
        Pattern::Bos { common, detail }
    } else {
        Pattern::Choch { common, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bar(ts_offset: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar {
            timestamp: Utc::now() + Duration::minutes(ts_offset),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    #[test]
    fn uptrend_break_is_classified_as_bos() {
        // Build a staircase: swing high around index 5, then a later close
        // breaks above it while trend is already bullish.
        let mut bars = Vec::new();
        for i in 0..4 {
            bars.push(bar(i, 1.10, 1.102, 1.098, 1.101));
        }
        bars.push(bar(4, 1.101, 1.110, 1.100, 1.108)); // swing high candidate
        for i in 5..9 {
            bars.push(bar(i, 1.10, 1.103, 1.098, 1.101));
        }
        // Break above the swing high after it's confirmed
        bars.push(bar(9, 1.108, 1.120, 1.107, 1.115));
        for i in 10..14 {
            bars.push(bar(i, 1.113, 1.116, 1.111, 1.114));
        }

        let patterns = detect_structure(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        assert!(!patterns.is_empty());
    }

    #[test]
    fn insufficient_bars_returns_empty() {
        let bars = vec![bar(0, 1.1, 1.11, 1.09, 1.1)];
        assert!(detect_structure(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default()).is_empty());
    }
}
