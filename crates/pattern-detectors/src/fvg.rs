use std::collections::HashSet;

use ict_core::{Bar, Direction, Pattern, PatternCommon, PatternStatus, PriceZone, Timeframe};

use crate::config::PatternDetectorConfig;

fn price_to_pips(price_diff: f64, symbol: &str) -> f64 {
    (price_diff / ict_core::pip_size(symbol)).abs()
}

/// Fair Value Gap detector (§4.1.1). Pure, deterministic; tolerates short
/// windows by returning empty.
pub fn detect_fvg(
    bars: &[Bar],
    symbol: &str,
    timeframe: Timeframe,
    cfg: &PatternDetectorConfig,
) -> Vec<Pattern> {
    let mut out = Vec::new();
    if bars.len() < 3 {
        return out;
    }

    let last_index = bars.len() - 1;
    for i in 1..bars.len() - 1 {
        let prev = &bars[i - 1];
        let mid = &bars[i];
        let next = &bars[i + 1];

        // Bullish: gap between prev high and next low, confirmed by a
        // bullish middle candle.
        if next.low > prev.high && mid.close > mid.open {
            let gap_pips = price_to_pips(next.low - prev.high, symbol);
            if gap_pips >= cfg.min_gap_pips {
                out.push(build_fvg(
                    symbol,
                    timeframe,
                    Direction::Bullish,
                    i,
                    prev.high,
                    next.low,
                    gap_pips,
                    bars[i].timestamp,
                    i == last_index,
                ));
            }
        }

        // Bearish: gap between prev low and next high, confirmed by a
        // bearish middle candle.
        if next.high < prev.low && mid.close < mid.open {
            let gap_pips = price_to_pips(prev.low - next.high, symbol);
            if gap_pips >= cfg.min_gap_pips {
                out.push(build_fvg(
                    symbol,
                    timeframe,
                    Direction::Bearish,
                    i,
                    next.high,
                    prev.low,
                    gap_pips,
                    bars[i].timestamp,
                    i == last_index,
                ));
            }
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn build_fvg(
    symbol: &str,
    timeframe: Timeframe,
    direction: Direction,
    origin_bar_index: usize,
    low: f64,
    high: f64,
    gap_pips: f64,
    detected_at: chrono::DateTime<chrono::Utc>,
    just_formed: bool,
) -> Pattern {
    let base_score = 55.0 + (gap_pips * 2.0).min(25.0);
    let base_confidence = (0.4 + (gap_pips * 0.05).min(0.4)).min(0.9);

    Pattern::Fvg {
        common: PatternCommon {
            id: 0,
            symbol: symbol.to_string(),
            timeframe,
            direction,
            detected_at,
            origin_bar_index,
            price_zone: PriceZone::new(low, high),
            base_score,
            base_confidence,
            enhanced_confidence: base_confidence,
            status: PatternStatus::Active,
            confluences: HashSet::new(),
            just_formed,
        },
        detail: ict_core::FvgDetail {
            gap_pips,
            fill_percentage: 0.0,
            mitigation_ts: None,
        },
    }
}

/// Advance an FVG's `fill_percentage` against a new bar touching its zone.
/// Transitions `active -> partial -> mitigated` are monotonic; a pattern
/// never un-mitigates (§3 invariant).
pub fn update_fvg_fill(pattern: &mut Pattern, bar: &Bar) {
    let Pattern::Fvg { common, detail } = pattern else {
        return;
    };
    if common.status == PatternStatus::Mitigated {
        return;
    }
    let zone = common.price_zone;
    let overlap_low = bar.low.max(zone.low);
    let overlap_high = bar.high.min(zone.high);
    if overlap_high <= overlap_low {
        return;
    }
    let filled = (overlap_high - overlap_low) / zone.width() * 100.0;
    let new_fill = filled.max(detail.fill_percentage).min(100.0);
    detail.fill_percentage = new_fill;
    if new_fill >= 100.0 {
        common.status = PatternStatus::Mitigated;
        detail.mitigation_ts = Some(bar.timestamp);
    } else if new_fill > 0.0 {
        common.status = PatternStatus::Partial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    /// Literal scenario from §8: gap of 10 pips -> base_score 75, base_confidence 0.9.
    #[test]
    fn bullish_fvg_matches_literal_scenario() {
        let bars = vec![
            bar(1.0993, 1.1000, 1.0990, 1.0995),
            bar(1.1002, 1.1020, 1.1000, 1.1018),
            bar(1.1015, 1.1040, 1.1010, 1.1035),
        ];
        let patterns = detect_fvg(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        assert_eq!(patterns.len(), 1);
        let Pattern::Fvg { common, detail } = &patterns[0] else {
            panic!("expected fvg");
        };
        assert_eq!(common.direction, Direction::Bullish);
        assert!((common.price_zone.low - 1.1000).abs() < 1e-9);
        assert!((common.price_zone.high - 1.1010).abs() < 1e-9);
        assert!((detail.gap_pips - 10.0).abs() < 1e-6);
        assert!((common.base_score - 75.0).abs() < 1e-6);
        assert!((common.base_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn rejects_gaps_below_minimum() {
        let bars = vec![
            bar(1.0993, 1.1000, 1.0990, 1.0995),
            bar(1.10005, 1.10015, 1.10001, 1.10012),
            bar(1.1001, 1.1005, 1.10002, 1.1004),
        ];
        let patterns = detect_fvg(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        assert!(patterns.is_empty());
    }

    #[test]
    fn insufficient_bars_returns_empty() {
        let bars = vec![bar(1.0, 1.1, 0.9, 1.05)];
        assert!(detect_fvg(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default()).is_empty());
    }

    #[test]
    fn fill_percentage_is_monotonic_and_mitigates() {
        let bars = vec![
            bar(1.0993, 1.1000, 1.0990, 1.0995),
            bar(1.1002, 1.1020, 1.1000, 1.1018),
            bar(1.1015, 1.1040, 1.1010, 1.1035),
        ];
        let mut patterns = detect_fvg(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        let pattern = &mut patterns[0];

        let touch = Bar {
            timestamp: Utc::now() + Duration::minutes(15),
            open: 1.1008,
            high: 1.1009,
            low: 1.1002,
            close: 1.1003,
            volume: 1.0,
        };
        update_fvg_fill(pattern, &touch);
        let Pattern::Fvg { detail, common } = pattern else { unreachable!() };
        assert!(detail.fill_percentage > 0.0);
        assert_eq!(common.status, PatternStatus::Partial);

        let full_fill = Bar {
            timestamp: Utc::now() + Duration::minutes(30),
            open: 1.1010,
            high: 1.1011,
            low: 1.0999,
            close: 1.1000,
            volume: 1.0,
        };
        update_fvg_fill(pattern, &full_fill);
        let Pattern::Fvg { detail, common } = pattern else { unreachable!() };
        assert_eq!(detail.fill_percentage, 100.0);
        assert_eq!(common.status, PatternStatus::Mitigated);
    }
}
