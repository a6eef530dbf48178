use std::collections::HashSet;

use ict_core::{Bar, Direction, DisplacementDetail, Pattern, PatternCommon, PatternStatus, PriceZone, Timeframe};

use crate::config::PatternDetectorConfig;

const RUN_LEN: usize = 3;
const ATR_LOOKBACK: usize = 10;

/// Displacement detector: a run of `RUN_LEN` consecutive same-direction
/// candles whose combined body exceeds `ob_impulse_multiplier` times the
/// average true range of the preceding `ATR_LOOKBACK` bars — a strong
/// directional push through a zone, distinct from the single-candle
/// impulse used by the order block detector.
pub fn detect_displacement(
    bars: &[Bar],
    symbol: &str,
    timeframe: Timeframe,
    cfg: &PatternDetectorConfig,
) -> Vec<Pattern> {
    let mut out = Vec::new();
    if bars.len() < ATR_LOOKBACK + RUN_LEN {
        return out;
    }

    let last_index = bars.len() - 1;
    for end in RUN_LEN - 1..bars.len() {
        let start = end + 1 - RUN_LEN;
        let run = &bars[start..=end];
        let all_bullish = run.iter().all(|b| b.is_bullish());
        let all_bearish = run.iter().all(|b| b.is_bearish());
        if !all_bullish && !all_bearish {
            continue;
        }

        let atr_window_start = start.saturating_sub(ATR_LOOKBACK);
        if atr_window_start == start {
            continue;
        }
        let atr: f64 = bars[atr_window_start..start]
            .iter()
            .map(|b| b.high - b.low)
            .sum::<f64>()
            / (start - atr_window_start) as f64;
        if atr <= 0.0 {
            continue;
        }

        let combined_body: f64 = run.iter().map(|b| b.body()).sum();
        if combined_body <= cfg.ob_impulse_multiplier * atr {
            continue;
        }

        let direction = if all_bullish {
            Direction::Bullish
        } else {
            Direction::Bearish
        };
        let low = run.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let high = run.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let strength = (60.0 + combined_body / atr * 5.0).min(95.0);

        out.push(Pattern::Displacement {
            common: PatternCommon {
                id: 0,
                symbol: symbol.to_string(),
                timeframe,
                direction,
                detected_at: bars[end].timestamp,
                origin_bar_index: end,
                price_zone: PriceZone::new(low, high),
                base_score: strength,
                base_confidence: (strength / 100.0).min(0.9),
                enhanced_confidence: (strength / 100.0).min(0.9),
                status: PatternStatus::Active,
                confluences: HashSet::new(),
                just_formed: end == last_index,
            },
            detail: DisplacementDetail {
                impulse_magnitude: combined_body / atr,
                bars_spanned: RUN_LEN,
            },
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bar(i: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar {
            timestamp: Utc::now() + Duration::minutes(i),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    #[test]
    fn detects_strong_bullish_run() {
        let mut bars: Vec<Bar> = (0..10).map(|i| bar(i, 1.10, 1.1005, 1.0995, 1.1001)).collect();
        bars.push(bar(10, 1.1001, 1.1030, 1.1000, 1.1028));
        bars.push(bar(11, 1.1028, 1.1060, 1.1025, 1.1055));
        bars.push(bar(12, 1.1055, 1.1090, 1.1050, 1.1085));
        let patterns =
            detect_displacement(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        assert!(!patterns.is_empty());
        assert!(matches!(patterns[0], Pattern::Displacement { .. }));
    }

    #[test]
    fn insufficient_bars_returns_empty() {
        let bars: Vec<Bar> = (0..5).map(|i| bar(i, 1.1, 1.11, 1.09, 1.1)).collect();
        assert!(
            detect_displacement(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default())
                .is_empty()
        );
    }
}
