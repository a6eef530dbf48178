use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Direction, PatternStatus, PriceZone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    Fvg,
    OrderBlock,
    Bos,
    Choch,
    LiquidityPool,
    Displacement,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Fvg => "fvg",
            PatternKind::OrderBlock => "order_block",
            PatternKind::Bos => "bos",
            PatternKind::Choch => "choch",
            PatternKind::LiquidityPool => "liquidity_pool",
            PatternKind::Displacement => "displacement",
        }
    }
}

/// Fields shared by every pattern variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCommon {
    /// Stable across memory updates; used as the arena id referenced by
    /// BOS/CHoCH `prior_structure_ref` (see `SwingArena` in pattern-detectors).
    pub id: u64,
    pub symbol: String,
    pub timeframe: crate::types::Timeframe,
    pub direction: Direction,
    pub detected_at: DateTime<Utc>,
    pub origin_bar_index: usize,
    pub price_zone: PriceZone,
    pub base_score: f64,
    pub base_confidence: f64,
    pub enhanced_confidence: f64,
    pub status: PatternStatus,
    pub confluences: HashSet<String>,
    /// True when the pattern formed on the most recent bar in the window.
    pub just_formed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FvgDetail {
    pub gap_pips: f64,
    pub fill_percentage: f64,
    pub mitigation_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBlockDetail {
    pub impulse_magnitude: f64,
    pub test_count: u32,
    pub max_tests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureBreakDetail {
    pub break_level: f64,
    /// Stable arena id of the swing point that was broken.
    pub prior_structure_ref: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityPoolDetail {
    pub cluster_size: u32,
    pub tolerance_pips: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplacementDetail {
    pub impulse_magnitude: f64,
    pub bars_spanned: usize,
}

/// Sum type over the six pattern kinds. A tagged union rather than dynamic
/// dispatch, per the "dynamic dispatch across detectors" design note: each
/// detector is a free function producing one of these variants directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Pattern {
    Fvg {
        common: PatternCommon,
        detail: FvgDetail,
    },
    OrderBlock {
        common: PatternCommon,
        detail: OrderBlockDetail,
    },
    Bos {
        common: PatternCommon,
        detail: StructureBreakDetail,
    },
    Choch {
        common: PatternCommon,
        detail: StructureBreakDetail,
    },
    LiquidityPool {
        common: PatternCommon,
        detail: LiquidityPoolDetail,
    },
    Displacement {
        common: PatternCommon,
        detail: DisplacementDetail,
    },
}

impl Pattern {
    pub fn kind(&self) -> PatternKind {
        match self {
            Pattern::Fvg { .. } => PatternKind::Fvg,
            Pattern::OrderBlock { .. } => PatternKind::OrderBlock,
            Pattern::Bos { .. } => PatternKind::Bos,
            Pattern::Choch { .. } => PatternKind::Choch,
            Pattern::LiquidityPool { .. } => PatternKind::LiquidityPool,
            Pattern::Displacement { .. } => PatternKind::Displacement,
        }
    }

    pub fn common(&self) -> &PatternCommon {
        match self {
            Pattern::Fvg { common, .. }
            | Pattern::OrderBlock { common, .. }
            | Pattern::Bos { common, .. }
            | Pattern::Choch { common, .. }
            | Pattern::LiquidityPool { common, .. }
            | Pattern::Displacement { common, .. } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut PatternCommon {
        match self {
            Pattern::Fvg { common, .. }
            | Pattern::OrderBlock { common, .. }
            | Pattern::Bos { common, .. }
            | Pattern::Choch { common, .. }
            | Pattern::LiquidityPool { common, .. }
            | Pattern::Displacement { common, .. } => common,
        }
    }

    /// Default time-to-live per pattern kind, used by the expiry invariant
    /// `now > detected_at + pattern_ttl[kind]` (§3).
    pub fn default_ttl(kind: PatternKind) -> chrono::Duration {
        match kind {
            PatternKind::Fvg => chrono::Duration::hours(48),
            PatternKind::OrderBlock => chrono::Duration::hours(72),
            PatternKind::Bos | PatternKind::Choch => chrono::Duration::hours(24),
            PatternKind::LiquidityPool => chrono::Duration::hours(96),
            PatternKind::Displacement => chrono::Duration::hours(12),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let common = self.common();
        if now > common.detected_at + Pattern::default_ttl(self.kind()) {
            return true;
        }
        if let Pattern::OrderBlock { detail, .. } = self {
            if detail.test_count >= detail.max_tests {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;

    fn sample_common() -> PatternCommon {
        PatternCommon {
            id: 1,
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M15,
            direction: Direction::Bullish,
            detected_at: Utc::now(),
            origin_bar_index: 10,
            price_zone: PriceZone::new(1.1000, 1.1010),
            base_score: 75.0,
            base_confidence: 0.9,
            enhanced_confidence: 0.9,
            status: PatternStatus::Active,
            confluences: HashSet::new(),
            just_formed: false,
        }
    }

    #[test]
    fn order_block_expires_at_max_tests() {
        let pattern = Pattern::OrderBlock {
            common: sample_common(),
            detail: OrderBlockDetail {
                impulse_magnitude: 0.002,
                test_count: 3,
                max_tests: 3,
            },
        };
        assert!(pattern.is_expired(Utc::now()));
    }

    #[test]
    fn fvg_does_not_expire_before_ttl() {
        let pattern = Pattern::Fvg {
            common: sample_common(),
            detail: FvgDetail {
                gap_pips: 10.0,
                fill_percentage: 0.0,
                mitigation_ts: None,
            },
        };
        assert!(!pattern.is_expired(Utc::now()));
    }
}
