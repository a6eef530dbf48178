use std::sync::Arc;

use chrono::{DateTime, Utc};
use ict_core::{Pattern, PatternKind, Timeframe};
use serde::Serialize;

use crate::store::HistoricalMemoryStore;

/// Metadata describing how memory altered a pattern's confidence, reported
/// alongside the enhanced pattern rather than folded invisibly into it.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEnhancement {
    pub memory_enhanced: bool,
    pub original_confidence: f64,
    pub historical_samples: usize,
    pub historical_success_rate: Option<f64>,
}

/// Unified Memory System (§4.2): the single entry point detectors and the
/// orchestrator use to weight fresh detections by historical performance
/// and to feed outcomes back in.
pub struct UnifiedMemorySystem {
    store: Arc<HistoricalMemoryStore>,
}

impl UnifiedMemorySystem {
    pub fn new(store: Arc<HistoricalMemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<HistoricalMemoryStore> {
        &self.store
    }

    /// `enhanced_confidence = clamp(base_confidence * weight + structural_bonus, 0, 0.95)`.
    /// `structural_bonus` comes from confluence scoring upstream (e.g. MTF
    /// validation) and is 0.0 when the caller has none to contribute.
    pub fn enhance(&self, mut pattern: Pattern, structural_bonus: f64) -> (Pattern, MemoryEnhancement) {
        let kind = pattern.kind();
        let common = pattern.common();
        let symbol = common.symbol.clone();
        let timeframe = common.timeframe;
        let original_confidence = common.base_confidence;

        let weight = self.store.get_performance_weight(kind, timeframe, &symbol);
        let samples = self.store.sample_count(kind, &symbol, timeframe);
        let success_rate = self.store.weighted_success_rate(kind, &symbol, timeframe);

        // No history: weight/bonus are not applied at all, not just flagged
        // via `memory_enhanced` (§4.2 cold-start invariant).
        let enhanced_confidence = if samples == 0 {
            original_confidence
        } else {
            (original_confidence * weight + structural_bonus).clamp(0.0, 0.95)
        };
        pattern.common_mut().enhanced_confidence = enhanced_confidence;

        let enhancement = MemoryEnhancement {
            memory_enhanced: samples > 0,
            original_confidence,
            historical_samples: samples,
            historical_success_rate: success_rate,
        };
        (pattern, enhancement)
    }

    pub fn record_outcome(
        &self,
        kind: PatternKind,
        symbol: &str,
        timeframe: Timeframe,
        success: bool,
        context: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) {
        self.store
            .record_outcome(kind, symbol, timeframe, success, context, timestamp);
    }

    pub fn confidence_adjustment(&self, kind: PatternKind, symbol: &str, timeframe: Timeframe) -> f64 {
        self.store.get_confidence_adjustment(kind, symbol, timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use ict_core::{Direction, FvgDetail, PatternCommon, PatternStatus, PriceZone};
    use std::collections::HashSet;

    fn sample_fvg() -> Pattern {
        Pattern::Fvg {
            common: PatternCommon {
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
                just_formed: true,
            },
            detail: FvgDetail {
                gap_pips: 10.0,
                fill_percentage: 0.0,
                mitigation_ts: None,
            },
        }
    }

    #[test]
    fn cold_pattern_is_not_flagged_memory_enhanced() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HistoricalMemoryStore::new(
            MemoryConfig::default(),
            dir.path().join("historical_analysis_cache.json"),
        ));
        let system = UnifiedMemorySystem::new(store);
        let (pattern, enhancement) = system.enhance(sample_fvg(), 0.0);
        assert!(!enhancement.memory_enhanced);
        assert_eq!(pattern.common().enhanced_confidence, pattern.common().base_confidence);
    }

    #[test]
    fn structural_bonus_raises_confidence_but_caps_at_0_95() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HistoricalMemoryStore::new(
            MemoryConfig::default(),
            dir.path().join("historical_analysis_cache.json"),
        ));
        // Seed one outcome so the pattern is no longer cold-start and the
        // weight/bonus formula actually runs.
        store.record_outcome(
            PatternKind::Fvg,
            "EURUSD",
            Timeframe::M15,
            true,
            serde_json::Value::Null,
            Utc::now(),
        );
        let system = UnifiedMemorySystem::new(store);
        let (pattern, enhancement) = system.enhance(sample_fvg(), 0.3);
        assert!(enhancement.memory_enhanced);
        assert!(pattern.common().enhanced_confidence <= 0.95);
    }

    #[test]
    fn cold_start_ignores_a_non_default_weight_multiplier() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MemoryConfig::default();
        config
            .weight_multipliers
            .insert(PatternKind::Fvg.into(), 0.5);
        let store = Arc::new(HistoricalMemoryStore::new(config, dir.path().join("historical_analysis_cache.json")));
        let system = UnifiedMemorySystem::new(store);
        let (pattern, enhancement) = system.enhance(sample_fvg(), 0.3);
        assert!(!enhancement.memory_enhanced);
        assert_eq!(pattern.common().enhanced_confidence, pattern.common().base_confidence);
    }
}
