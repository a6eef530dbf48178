use std::collections::HashSet;

use ict_core::{Bar, Direction, LiquidityPoolDetail, Pattern, PatternCommon, PatternStatus, PriceZone, Timeframe};

use crate::config::PatternDetectorConfig;
use crate::swing::{Swing, SwingKind, detect_swings};

/// Liquidity pool detector (§4.1.4). Clusters swing highs (resistance,
/// bearish pool) and swing lows (support, bullish pool) within a tolerance
/// band of `liquidity_tolerance_pips`.
pub fn detect_liquidity_pools(
    bars: &[Bar],
    symbol: &str,
    timeframe: Timeframe,
    cfg: &PatternDetectorConfig,
) -> Vec<Pattern> {
    let mut out = Vec::new();
    if bars.is_empty() {
        return out;
    }
    let arena = detect_swings(bars, cfg.swing_window);
    let tolerance = cfg.liquidity_tolerance_pips * ict_core::pip_size(symbol);
    let last_index = bars.len() - 1;

    let highs: Vec<&Swing> = arena.iter().filter(|s| s.kind == SwingKind::High).collect();
    let lows: Vec<&Swing> = arena.iter().filter(|s| s.kind == SwingKind::Low).collect();

    out.extend(cluster(
        &highs,
        tolerance,
        cfg.liquidity_tolerance_pips,
        symbol,
        timeframe,
        Direction::Bearish,
        bars,
        last_index,
    ));
    out.extend(cluster(
        &lows,
        tolerance,
        cfg.liquidity_tolerance_pips,
        symbol,
        timeframe,
        Direction::Bullish,
        bars,
        last_index,
    ));

    out
}

fn cluster(
    swings: &[&Swing],
    tolerance: f64,
    tolerance_pips: f64,
    symbol: &str,
    timeframe: Timeframe,
    direction: Direction,
    bars: &[Bar],
    last_index: usize,
) -> Vec<Pattern> {
    let mut sorted: Vec<&Swing> = swings.to_vec();
    sorted.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());

    let mut out = Vec::new();
    let mut group: Vec<&Swing> = Vec::new();

    let mut flush = |group: &mut Vec<&Swing>, out: &mut Vec<Pattern>| {
        if group.len() >= 2 {
            let min_price = group.iter().map(|s| s.price).fold(f64::MAX, f64::min);
            let max_price = group.iter().map(|s| s.price).fold(f64::MIN, f64::max);
            let latest = group.iter().map(|s| s.bar_index).max().unwrap_or(0);
            let strength = (60.0 + group.len() as f64 * 8.0).min(95.0);
            out.push(Pattern::LiquidityPool {
                common: PatternCommon {
                    id: 0,
                    symbol: symbol.to_string(),
                    timeframe,
                    direction,
                    detected_at: bars[latest].timestamp,
                    origin_bar_index: latest,
                    price_zone: PriceZone::new(
                        min_price.min(max_price - 1e-9),
                        (max_price).max(min_price + 1e-9),
                    ),
                    base_score: strength,
                    base_confidence: (strength / 100.0).min(0.9),
                    enhanced_confidence: (strength / 100.0).min(0.9),
                    status: PatternStatus::Active,
                    confluences: HashSet::new(),
                    just_formed: latest == last_index,
                },
                detail: LiquidityPoolDetail {
                    cluster_size: group.len() as u32,
                    tolerance_pips,
                },
            });
        }
        group.clear();
    };

    for swing in sorted {
        if let Some(first) = group.first() {
            if (swing.price - first.price).abs() > tolerance {
                flush(&mut group, &mut out);
            }
        }
        group.push(swing);
    }
    flush(&mut group, &mut out);

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
    fn clusters_equal_highs_into_bearish_pool() {
        // Two roughly-equal swing highs close enough in price to cluster.
        let mut bars = Vec::new();
        for i in 0..5 {
            bars.push(bar(i, 1.10, 1.101, 1.099, 1.100));
        }
        bars.push(bar(5, 1.100, 1.110, 1.099, 1.101)); // swing high #1
        for i in 6..11 {
            bars.push(bar(i, 1.10, 1.102, 1.099, 1.100));
        }
        bars.push(bar(11, 1.100, 1.1101, 1.099, 1.101)); // swing high #2, close price
        for i in 12..17 {
            bars.push(bar(i, 1.10, 1.102, 1.099, 1.100));
        }

        let patterns =
            detect_liquidity_pools(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default());
        assert!(patterns.iter().any(|p| matches!(p, Pattern::LiquidityPool { common, .. } if common.direction == Direction::Bearish)));
    }

    #[test]
    fn insufficient_bars_returns_empty() {
        let bars = vec![bar(0, 1.1, 1.11, 1.09, 1.1)];
        assert!(
            detect_liquidity_pools(&bars, "EURUSD", Timeframe::M15, &PatternDetectorConfig::default())
                .is_empty()
        );
    }
}
