use std::collections::HashSet;

use ict_core::{Bar, Direction, OrderBlockDetail, Pattern, PatternCommon, PatternStatus, PriceZone, Timeframe};

use crate::config::PatternDetectorConfig;

const LOOKBACK: usize = 5;
const LOOKAHEAD: usize = 10;

/// Order Block detector (§4.1.2). An impulse candle whose body exceeds
/// `ob_impulse_multiplier` times the mean body of the preceding 5 bars
/// becomes a candidate if any of the next 10 bars overlaps its (low, high)
/// band.
pub fn detect_order_blocks(
    bars: &[Bar],
    symbol: &str,
    timeframe: Timeframe,
    cfg: &PatternDetectorConfig,
) -> Vec<Pattern> {
    let mut out = Vec::new();
    if bars.len() < LOOKBACK + 1 {
        return out;
    }

    let last_index = bars.len() - 1;
    for i in LOOKBACK..bars.len() {
        let preceding = &bars[i - LOOKBACK..i];
        let mean_body: f64 =
            preceding.iter().map(|b| b.body()).sum::<f64>() / LOOKBACK as f64;
        if mean_body <= 0.0 {
            continue;
        }

        let impulse = &bars[i];
        if impulse.body() <= cfg.ob_impulse_multiplier * mean_body {
            continue;
        }

        let lookahead_end = (i + 1 + LOOKAHEAD).min(bars.len());
        let overlaps = bars[i + 1..lookahead_end]
            .iter()
            .any(|b| b.high >= impulse.low && b.low <= impulse.high);
        if !overlaps {
            continue;
        }

        let direction = if impulse.is_bullish() {
            Direction::Bullish
        } else {
            Direction::Bearish
        };

        let impulse_magnitude = impulse.body() / mean_body;
        let strength = (70.0 + impulse_magnitude * 5.0).clamp(70.0, 95.0);

        out.push(Pattern::OrderBlock {
            common: PatternCommon {
                id: 0,
                symbol: symbol.to_string(),
                timeframe,
                direction,
                detected_at: impulse.timestamp,
                origin_bar_index: i,
                price_zone: PriceZone::new(impulse.low, impulse.high),
                base_score: strength,
                base_confidence: (strength / 100.0).min(0.9),
                enhanced_confidence: (strength / 100.0).min(0.9),
                status: PatternStatus::Active,
                confluences: HashSet::new(),
                just_formed: i == last_index,
            },
            detail: OrderBlockDetail {
                impulse_magnitude,
                test_count: 0,
                max_tests: 3,
            },
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn flat_bar(price: f64) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: price,
            high: price + 0.0002,
            low: price - 0.0002,
            close: price + 0.0001,
            volume: 1.0,
        }
    }

    fn impulse_bar(open: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open,
            high: open.max(close) + 0.0001,
            low: open.min(close) - 0.0001,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn detects_bullish_order_block_with_retest() {
        let mut bars: Vec<Bar> = (0..5).map(|_| flat_bar(1.1000)).collect();
        bars.push(impulse_bar(1.1000, 1.1080));
        for _ in 0..10 {
            bars.push(flat_bar(1.1020));
        }
        let patterns =
            detect_order_blocks(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        assert_eq!(patterns.len(), 1);
        let Pattern::OrderBlock { common, .. } = &patterns[0] else {
            panic!("expected order block");
        };
        assert_eq!(common.direction, Direction::Bullish);
        assert!(common.base_score >= 70.0 && common.base_score <= 95.0);
    }

    #[test]
    fn no_order_block_without_retest() {
        let mut bars: Vec<Bar> = (0..5).map(|_| flat_bar(1.1000)).collect();
        bars.push(impulse_bar(1.1000, 1.1080));
        for _ in 0..10 {
            bars.push(flat_bar(1.2000));
        }
        let patterns =
            detect_order_blocks(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        assert!(patterns.is_empty());
    }

    #[test]
    fn insufficient_bars_returns_empty() {
        let bars = vec![flat_bar(1.1)];
        assert!(
            detect_order_blocks(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default())
                .is_empty()
        );
    }
}
