use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ict_core::{PatternKind, Timeframe};
use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub context: serde_json::Value,
}

/// Rolling sample of outcomes for one (pattern_kind, symbol, timeframe) key.
/// Bounded to 200 entries; oldest is evicted on overflow (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub outcomes: Vec<Outcome>,
}

const MAX_OUTCOMES: usize = 200;

impl HistoricalRecord {
    fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
        if self.outcomes.len() > MAX_OUTCOMES {
            self.outcomes.remove(0);
        }
    }

    /// Weighted success rate with time decay: `w = max(0.1, 1 - d*decay)`
    /// per outcome of age `d` days; rate = `Σ(success·w) / Σw` (§4.2).
    fn weighted_success_rate(&self, now: DateTime<Utc>, decay_factor: f64) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for outcome in &self.outcomes {
            let age_days = (now - outcome.timestamp).num_seconds() as f64 / 86_400.0;
            let w = (1.0 - age_days * decay_factor).max(0.1);
            weighted_sum += if outcome.success { w } else { 0.0 };
            weight_total += w;
        }
        if weight_total <= 0.0 {
            None
        } else {
            Some(weighted_sum / weight_total)
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Key(PatternKind, String, Timeframe);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    FirstRun,
    Learning,
    Experienced,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMetadata {
    created_at: DateTime<Utc>,
    version: String,
    system_state: SystemState,
    total_patterns_analyzed: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    metadata: SnapshotMetadata,
    cache_data: Vec<(String, String, String, HistoricalRecord)>,
}

const SNAPSHOT_VERSION: &str = "v1.0.0";

/// Historical Memory Store (B). Single writer per key via `DashMap`'s
/// internal sharded locking (an in-process analog of "single writer via a
/// queue, many readers via snapshot pointers" — see DESIGN.md); `get_*`
/// reads take a shard read lock briefly and never block on I/O.
pub struct HistoricalMemoryStore {
    records: DashMap<Key, HistoricalRecord>,
    config: MemoryConfig,
    total_updates: AtomicU64,
    system_state: std::sync::RwLock<SystemState>,
    snapshot_path: PathBuf,
}

impl HistoricalMemoryStore {
    pub fn new(config: MemoryConfig, snapshot_path: impl Into<PathBuf>) -> Self {
        let snapshot_path = snapshot_path.into();
        let (records, total, state) = Self::load_snapshot(&snapshot_path);
        Self {
            records,
            config,
            total_updates: AtomicU64::new(total),
            system_state: std::sync::RwLock::new(state),
            snapshot_path,
        }
    }

    fn load_snapshot(path: &Path) -> (DashMap<Key, HistoricalRecord>, u64, SystemState) {
        match ict_core::snapshot::read_json::<Snapshot>(path) {
            Ok(Some(snap)) => {
                let records = DashMap::new();
                for (kind, symbol, tf, record) in snap.cache_data {
                    let Some(kind) = parse_kind(&kind) else { continue };
                    let Some(tf) = parse_timeframe(&tf) else { continue };
                    records.insert(Key(kind, symbol, tf), record);
                }
                (records, snap.metadata.total_patterns_analyzed, snap.metadata.system_state)
            }
            Ok(None) => {
                tracing::warn!("no historical memory snapshot found, starting cold (COLD_START)");
                (DashMap::new(), 0, SystemState::FirstRun)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load historical memory snapshot, starting cold");
                (DashMap::new(), 0, SystemState::FirstRun)
            }
        }
    }

    /// Append an outcome to the rolling sample. Never blocks or errors the
    /// detection path (§4.2 failure semantics).
    pub fn record_outcome(
        &self,
        kind: PatternKind,
        symbol: &str,
        timeframe: Timeframe,
        success: bool,
        context: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) {
        let key = Key(kind, symbol.to_string(), timeframe);
        self.records
            .entry(key)
            .or_default()
            .push(Outcome {
                timestamp,
                success,
                context,
            });

        let updates = self.total_updates.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_system_state(updates);

        if self.config.snapshot_interval_updates > 0 && updates % self.config.snapshot_interval_updates == 0 {
            if let Err(e) = self.export_snapshot() {
                tracing::warn!(error = %e, "failed to persist historical memory snapshot, will retry on next cadence");
            }
        }
    }

    fn update_system_state(&self, total_updates: u64) {
        let new_state = if total_updates == 0 {
            SystemState::FirstRun
        } else if total_updates < 100 {
            SystemState::Learning
        } else {
            SystemState::Experienced
        };
        *self.system_state.write().unwrap() = new_state;
    }

    /// Performance weight in `[0.5, 1.5]` for (kind, timeframe, symbol).
    pub fn get_performance_weight(&self, kind: PatternKind, timeframe: Timeframe, symbol: &str) -> f64 {
        let key = Key(kind, symbol.to_string(), timeframe);
        let base = self.config.cold_start_weight(kind);

        let rate = self.records.get(&key).and_then(|record| {
            if record.outcomes.len() < self.config.min_samples {
                None
            } else {
                record.weighted_success_rate(Utc::now(), self.config.time_decay_factor)
            }
        });

        let Some(rate) = rate else {
            tracing::debug!(kind = kind.as_str(), symbol, "COLD_START performance weight");
            return base;
        };

        let threshold = self.config.success_threshold;
        if rate >= threshold {
            (base * (1.0 + (rate - threshold) * (5.0 / 3.0))).min(base * 1.5)
        } else {
            (base * (0.5 + rate / threshold * 0.5)).max(base * 0.5)
        }
    }

    /// Confidence adjustment in `[-0.2, 0.3]` derived from the same
    /// historical sample, used directly by the Unified Memory System.
    pub fn get_confidence_adjustment(&self, kind: PatternKind, symbol: &str, timeframe: Timeframe) -> f64 {
        let weight = self.get_performance_weight(kind, timeframe, symbol);
        // weight in [0.5, 1.5] -> adjustment in [-0.2, 0.3], linear.
        (((weight - 1.0) * 0.5) - 0.05).clamp(-0.2, 0.3)
    }

    pub fn sample_count(&self, kind: PatternKind, symbol: &str, timeframe: Timeframe) -> usize {
        let key = Key(kind, symbol.to_string(), timeframe);
        self.records.get(&key).map(|r| r.outcomes.len()).unwrap_or(0)
    }

    pub fn weighted_success_rate(&self, kind: PatternKind, symbol: &str, timeframe: Timeframe) -> Option<f64> {
        let key = Key(kind, symbol.to_string(), timeframe);
        self.records
            .get(&key)
            .and_then(|r| r.weighted_success_rate(Utc::now(), self.config.time_decay_factor))
    }

    pub fn system_state(&self) -> SystemState {
        *self.system_state.read().unwrap()
    }

    /// Atomic snapshot export (write-temp-then-rename). Logged and retried
    /// on failure; never propagated as a detection-path error.
    pub fn export_snapshot(&self) -> std::io::Result<()> {
        let cache_data = self
            .records
            .iter()
            .map(|entry| {
                let Key(kind, symbol, tf) = entry.key();
                (
                    kind.as_str().to_string(),
                    symbol.clone(),
                    tf.as_str().to_string(),
                    entry.value().clone(),
                )
            })
            .collect();
        let snapshot = Snapshot {
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                version: SNAPSHOT_VERSION.to_string(),
                system_state: self.system_state(),
                total_patterns_analyzed: self.total_updates.load(Ordering::Relaxed),
            },
            cache_data,
        };
        ict_core::snapshot::write_json_atomic(&self.snapshot_path, &snapshot)
    }

    pub fn retain_within_lookback(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(self.config.max_lookback_days);
        for mut entry in self.records.iter_mut() {
            entry.outcomes.retain(|o| o.timestamp >= cutoff);
        }
    }
}

fn parse_kind(s: &str) -> Option<PatternKind> {
    Some(match s {
        "fvg" => PatternKind::Fvg,
        "order_block" => PatternKind::OrderBlock,
        "bos" => PatternKind::Bos,
        "choch" => PatternKind::Choch,
        "liquidity_pool" => PatternKind::LiquidityPool,
        "displacement" => PatternKind::Displacement,
        _ => return None,
    })
}

fn parse_timeframe(s: &str) -> Option<Timeframe> {
    Some(match s {
        "M1" => Timeframe::M1,
        "M5" => Timeframe::M5,
        "M15" => Timeframe::M15,
        "H1" => Timeframe::H1,
        "H4" => Timeframe::H4,
        "D1" => Timeframe::D1,
        _ => return None,
    })
}
