use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ict_core::{Direction, Pattern, PatternKind, Timeframe};

use crate::significance::significance_for;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub consolidated_ttl_ms: i64,
    pub scalping_timeframes: Vec<Timeframe>,
    pub scalping_confidence_threshold: f64,
    pub high_confidence_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            consolidated_ttl_ms: 2_000,
            scalping_timeframes: vec![Timeframe::M1, Timeframe::M5],
            scalping_confidence_threshold: 0.7,
            high_confidence_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternSummaryEntry {
    pub confidence: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct SetupSummary {
    pub kind: PatternKind,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub confidence: f64,
    pub direction: Direction,
    pub significance: ict_core::Significance,
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidatedView {
    pub best_overall_setup: Option<SetupSummary>,
    pub patterns_summary: HashMap<PatternKind, PatternSummaryEntry>,
    pub scalping_opportunities: Vec<SetupSummary>,
    pub high_confidence_patterns: Vec<SetupSummary>,
}

struct CacheEntry {
    view: ConsolidatedView,
    cached_at: DateTime<Utc>,
}

fn stream_key(symbol: &str, timeframes: &[Timeframe]) -> String {
    let mut sorted = timeframes.to_vec();
    sorted.sort();
    let tf_part: Vec<&str> = sorted.iter().map(|t| t.as_str()).collect();
    format!("{symbol}:{}", tf_part.join(","))
}

fn summarize(pattern: &Pattern) -> SetupSummary {
    let common = pattern.common();
    SetupSummary {
        kind: pattern.kind(),
        symbol: common.symbol.clone(),
        timeframe: common.timeframe,
        confidence: common.enhanced_confidence,
        direction: common.direction,
        significance: significance_for(common),
    }
}

fn build_view(patterns: &[Pattern], config: &OrchestratorConfig) -> ConsolidatedView {
    let summaries: Vec<SetupSummary> = patterns.iter().map(summarize).collect();

    let best_overall_setup = summaries
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap()
                .then(a.significance.cmp(&b.significance))
        })
        .cloned();

    let mut patterns_summary: HashMap<PatternKind, PatternSummaryEntry> = HashMap::new();
    for s in &summaries {
        patterns_summary
            .entry(s.kind)
            .and_modify(|e| {
                if s.confidence > e.confidence {
                    e.confidence = s.confidence;
                    e.direction = s.direction;
                }
            })
            .or_insert_with(|| PatternSummaryEntry {
                confidence: s.confidence,
                direction: s.direction,
            });
    }

    let scalping_opportunities: Vec<SetupSummary> = summaries
        .iter()
        .filter(|s| {
            config.scalping_timeframes.contains(&s.timeframe) && s.confidence >= config.scalping_confidence_threshold
        })
        .cloned()
        .collect();

    let high_confidence_patterns: Vec<SetupSummary> = summaries
        .into_iter()
        .filter(|s| s.confidence >= config.high_confidence_threshold)
        .collect();

    ConsolidatedView {
        best_overall_setup,
        patterns_summary,
        scalping_opportunities,
        high_confidence_patterns,
    }
}

/// Read-only aggregation surface over detector output (§4.10). Never
/// writes pattern state; `refresh` supplies the current detector output
/// for a (symbol, timeframe-set) window when the cached view has expired.
pub struct PatternOrchestrator {
    config: OrchestratorConfig,
    cache: DashMap<String, CacheEntry>,
}

impl PatternOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            cache: DashMap::new(),
        }
    }

    /// Returns the cached consolidated view if still fresh; otherwise
    /// invokes `refresh` to obtain the current pattern set, rebuilds the
    /// view, and caches it.
    pub fn consolidated_view(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
        refresh: impl FnOnce() -> Vec<Pattern>,
    ) -> ConsolidatedView {
        let key = stream_key(symbol, timeframes);
        if let Some(entry) = self.cache.get(&key) {
            let age_ms = (Utc::now() - entry.cached_at).num_milliseconds();
            if age_ms < self.config.consolidated_ttl_ms {
                return entry.view.clone();
            }
        }

        let patterns = refresh();
        let view = build_view(&patterns, &self.config);
        self.cache.insert(
            key,
            CacheEntry {
                view: view.clone(),
                cached_at: Utc::now(),
            },
        );
        view
    }
}
