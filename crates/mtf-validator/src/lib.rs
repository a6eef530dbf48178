//! Multi-Timeframe Validator (E): scores a pattern's directional bias
//! against H4 trend, M15 swing proximity, and M5 recency, adding bonus
//! confidence for each confluence that agrees.
//!
//! Restructured from `multi-timeframe/src/lib.rs`'s `Timeframe`-keyed
//! analyzer shape (kept here as the `ValidatorConfig`/context split); the
//! scoring rule itself is new.

use chrono::{DateTime, Utc};
use ict_core::{Direction, Pattern};
use pattern_detectors::swing::{Swing, SwingArena, SwingKind};
use serde::{Deserialize, Serialize};

const MTF_VALIDATED_TAG: &str = "mtf_validated";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub h4_bonus: f64,
    pub m15_bonus: f64,
    pub m5_bonus: f64,
    pub timing_window_sec: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            h4_bonus: 0.15,
            m15_bonus: 0.10,
            m5_bonus: 0.05,
            timing_window_sec: 300,
        }
    }
}

/// H4 directional context, derived from the H4 BOS/CHoCH series.
#[derive(Debug, Clone, Copy)]
pub struct H4Context {
    pub trend: Direction,
}

/// M15 swing context: the swing arena for the same symbol at M15, plus the
/// M15 ATR used for the "within one ATR" proximity check.
pub struct M15Context<'a> {
    pub arena: &'a SwingArena,
    pub atr: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationFlags {
    pub h4_authority: bool,
    pub m15_alignment: bool,
    pub m5_timing: bool,
}

impl ValidationFlags {
    pub fn any(&self) -> bool {
        self.h4_authority || self.m15_alignment || self.m5_timing
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub flags: ValidationFlags,
    pub bonus: f64,
}

/// Apply MTF validation to `pattern` in place. Idempotent: a pattern already
/// carrying the `mtf_validated` tag is passed through unchanged and returns
/// a zeroed `ValidationResult` (§8 round-trip property).
pub fn validate(
    pattern: &mut Pattern,
    h4: Option<&H4Context>,
    m15: Option<&M15Context>,
    now: DateTime<Utc>,
    cfg: &ValidatorConfig,
) -> ValidationResult {
    let common = pattern.common();
    if common.confluences.contains(MTF_VALIDATED_TAG) {
        return ValidationResult::default();
    }

    let direction = common.direction;
    let price_zone = common.price_zone;
    let detected_at = common.detected_at;

    let mut flags = ValidationFlags::default();
    let mut bonus = 0.0;

    if let Some(h4) = h4 {
        if h4.trend == direction {
            flags.h4_authority = true;
            bonus += cfg.h4_bonus;
        }
    }

    if let Some(m15) = m15 {
        let wanted_kind = match direction {
            Direction::Bullish => SwingKind::Low,
            Direction::Bearish => SwingKind::High,
        };
        let near = m15
            .arena
            .iter()
            .filter(|s| s.kind == wanted_kind)
            .any(|s: &Swing| swing_within_zone_atr(s, price_zone, m15.atr));
        if near && m15.atr > 0.0 {
            flags.m15_alignment = true;
            bonus += cfg.m15_bonus;
        }
    }

    if (now - detected_at).num_seconds().abs() <= cfg.timing_window_sec {
        flags.m5_timing = true;
        bonus += cfg.m5_bonus;
    }

    let common_mut = pattern.common_mut();
    if flags.any() {
        common_mut.enhanced_confidence = (common_mut.enhanced_confidence + bonus).min(0.95);
        if flags.h4_authority {
            common_mut.confluences.insert("h4_authority".to_string());
        }
        if flags.m15_alignment {
            common_mut.confluences.insert("m15_alignment".to_string());
        }
        if flags.m5_timing {
            common_mut.confluences.insert("m5_timing".to_string());
        }
    }
    common_mut.confluences.insert(MTF_VALIDATED_TAG.to_string());

    tracing::debug!(
        h4 = flags.h4_authority,
        m15 = flags.m15_alignment,
        m5 = flags.m5_timing,
        bonus,
        "mtf validation applied"
    );

    ValidationResult { flags, bonus }
}

fn swing_within_zone_atr(swing: &Swing, zone: ict_core::PriceZone, atr: f64) -> bool {
    let distance = if swing.price < zone.low {
        zone.low - swing.price
    } else if swing.price > zone.high {
        swing.price - zone.high
    } else {
        0.0
    };
    distance <= atr
}
