use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::stats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitoring_interval_sec")]
    pub monitoring_interval_sec: u64,
    #[serde(default = "default_min_samples_for_baseline")]
    pub min_samples_for_baseline: usize,
    #[serde(default = "default_tolerance_pct")]
    pub tolerance_pct: f64,
    #[serde(default = "default_critical_tolerance_pct")]
    pub critical_tolerance_pct: f64,
    #[serde(default = "default_rolling_update_min_samples")]
    pub rolling_update_min_samples: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_auto_baseline_update")]
    pub auto_baseline_update: bool,
}

fn default_monitoring_interval_sec() -> u64 { 30 }
fn default_min_samples_for_baseline() -> usize { 100 }
fn default_tolerance_pct() -> f64 { 20.0 }
fn default_critical_tolerance_pct() -> f64 { 50.0 }
fn default_rolling_update_min_samples() -> usize { 50 }
fn default_retention_days() -> i64 { 30 }
fn default_auto_baseline_update() -> bool { true }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_sec: default_monitoring_interval_sec(),
            min_samples_for_baseline: default_min_samples_for_baseline(),
            tolerance_pct: default_tolerance_pct(),
            critical_tolerance_pct: default_critical_tolerance_pct(),
            rolling_update_min_samples: default_rolling_update_min_samples(),
            retention_days: default_retention_days(),
            auto_baseline_update: default_auto_baseline_update(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Stable,
    Improved,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std_dev: f64,
    pub samples_count: usize,
    pub established_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationReport {
    pub metric_name: String,
    pub current_value: f64,
    pub baseline_value: f64,
    pub deviation_pct: f64,
    pub status: Status,
}

struct Sample {
    value: f64,
    timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct MetricState {
    samples: Vec<Sample>,
    baseline: Option<Baseline>,
    samples_since_baseline_update: usize,
}

/// Lower-is-better metrics (§4.9): anything naming a cost rather than a
/// throughput. Matches the original system's keyword list verbatim.
fn lower_is_better(metric_name: &str) -> bool {
    let name = metric_name.to_lowercase();
    ["latency", "usage", "cpu", "memory", "response_time"]
        .iter()
        .any(|kw| name.contains(kw))
}

fn classify(deviation_pct: f64, lower_is_better: bool, tolerance_pct: f64, critical_tolerance_pct: f64) -> Status {
    let abs_dev = deviation_pct.abs();
    if abs_dev <= tolerance_pct {
        Status::Stable
    } else if abs_dev <= critical_tolerance_pct {
        let degraded = if lower_is_better { deviation_pct > 0.0 } else { deviation_pct < 0.0 };
        if degraded { Status::Degraded } else { Status::Improved }
    } else {
        Status::Critical
    }
}

/// Sampling/baseline-establishment/deviation-classification engine (§4.9),
/// grounded on `original_source/01-CORE/monitoring/baseline_metrics_system.py`'s
/// `BaselineMetricsSystem` (`_update_baseline`, `_determine_status`), rebuilt
/// as a rule-based-only store without the Python GC/psutil system sampling
/// (process CPU/RSS collection belongs to the engine binary, not this crate).
pub struct BaselineMonitor {
    config: MonitorConfig,
    state: Mutex<HashMap<String, MetricState>>,
}

impl BaselineMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Load established baselines from `path` (§6's `metrics/
    /// baseline_metrics.json`) if present, otherwise start cold — a
    /// missing or unreadable snapshot is never fatal, matching the
    /// historical memory store's own failure semantics (§4.2).
    pub fn with_snapshot(config: MonitorConfig, path: &Path) -> Self {
        let monitor = Self::new(config);
        match ict_core::snapshot::read_json::<HashMap<String, Baseline>>(path) {
            Ok(Some(baselines)) => {
                let mut guard = monitor.state.lock().unwrap();
                for (metric_name, baseline) in baselines {
                    guard.entry(metric_name).or_default().baseline = Some(baseline);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to load baseline metrics snapshot, starting cold"),
        }
        monitor
    }

    /// Persist established baselines to `path` (write-temp-then-rename).
    /// Metrics with no baseline established yet are omitted.
    pub fn export_snapshot(&self, path: &Path) -> std::io::Result<()> {
        let guard = self.state.lock().unwrap();
        let baselines: HashMap<String, Baseline> = guard
            .iter()
            .filter_map(|(name, state)| state.baseline.clone().map(|b| (name.clone(), b)))
            .collect();
        ict_core::snapshot::write_json_atomic(path, &baselines)
    }

    /// Record one sample for `metric_name`; `operation` is attached only to
    /// the tracing event, not stored. Returns a deviation report once a
    /// baseline exists.
    pub fn record(&self, metric_name: &str, value: f64, operation: &str) -> Option<DeviationReport> {
        let now = Utc::now();
        let mut guard = self.state.lock().unwrap();
        let entry = guard.entry(metric_name.to_string()).or_default();
        entry.samples.push(Sample { value, timestamp: now });

        if entry.baseline.is_none() {
            if entry.samples.len() >= self.config.min_samples_for_baseline {
                let values: Vec<f64> = entry.samples.iter().map(|s| s.value).collect();
                let baseline = Baseline {
                    value: stats::median(&values),
                    min: stats::min(&values),
                    max: stats::max(&values),
                    avg: stats::mean(&values),
                    std_dev: stats::std_dev(&values),
                    samples_count: values.len(),
                    established_at: now,
                    last_updated: now,
                };
                tracing::info!(metric_name, baseline = baseline.value, "baseline established");
                entry.baseline = Some(baseline);
                entry.samples_since_baseline_update = 0;
            }
            return None;
        }

        entry.samples_since_baseline_update += 1;
        if self.config.auto_baseline_update
            && entry.samples_since_baseline_update >= self.config.rolling_update_min_samples
        {
            let values: Vec<f64> = entry.samples.iter().map(|s| s.value).collect();
            if let Some(baseline) = entry.baseline.as_mut() {
                baseline.avg = stats::mean(&values);
                baseline.min = stats::min(&values);
                baseline.max = stats::max(&values);
                baseline.std_dev = stats::std_dev(&values);
                baseline.samples_count = values.len();
                baseline.last_updated = now;
            }
            entry.samples_since_baseline_update = 0;
        }

        let baseline_value = entry.baseline.as_ref().unwrap().value;
        if baseline_value == 0.0 {
            return None;
        }
        let deviation_pct = (value - baseline_value) / baseline_value * 100.0;
        let status = classify(
            deviation_pct,
            lower_is_better(metric_name),
            self.config.tolerance_pct,
            self.config.critical_tolerance_pct,
        );

        if status == Status::Critical || status == Status::Degraded {
            tracing::warn!(metric_name, operation, %value, baseline_value, deviation_pct, ?status, "performance deviation");
        }

        Some(DeviationReport {
            metric_name: metric_name.to_string(),
            current_value: value,
            baseline_value,
            deviation_pct,
            status,
        })
    }

    pub fn baseline_for(&self, metric_name: &str) -> Option<Baseline> {
        self.state.lock().unwrap().get(metric_name).and_then(|s| s.baseline.clone())
    }

    pub fn samples_for(&self, metric_name: &str) -> Vec<f64> {
        self.state
            .lock()
            .unwrap()
            .get(metric_name)
            .map(|s| s.samples.iter().map(|s| s.value).collect())
            .unwrap_or_default()
    }

    /// Time-based eviction of raw samples older than `retention_days` (§4.9).
    pub fn evict_expired(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::days(self.config.retention_days);
        let mut guard = self.state.lock().unwrap();
        for state in guard.values_mut() {
            state.samples.retain(|s| s.timestamp >= cutoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_monitor(min_samples: usize) -> BaselineMonitor {
        BaselineMonitor::new(MonitorConfig {
            min_samples_for_baseline: min_samples,
            ..MonitorConfig::default()
        })
    }

    /// Literal scenario from §8: baseline=50ms, sample=80ms, tolerance 20%,
    /// critical 50% -> deviation=+60% -> critical ("latency" is lower-is-better).
    #[test]
    fn latency_spike_past_critical_tolerance_is_critical() {
        let monitor = seeded_monitor(1);
        monitor.record("pattern_detector_latency_ms", 50.0, "warmup");
        let report = monitor.record("pattern_detector_latency_ms", 80.0, "detect_all").unwrap();
        assert!((report.deviation_pct - 60.0).abs() < 1e-9);
        assert_eq!(report.status, Status::Critical);
    }

    #[test]
    fn no_baseline_yet_returns_none() {
        let monitor = seeded_monitor(10);
        assert!(monitor.record("pattern_detector_latency_ms", 50.0, "warmup").is_none());
    }

    #[test]
    fn small_deviation_within_tolerance_is_stable() {
        let monitor = seeded_monitor(1);
        monitor.record("pattern_detector_latency_ms", 100.0, "warmup");
        let report = monitor.record("pattern_detector_latency_ms", 105.0, "detect_all").unwrap();
        assert_eq!(report.status, Status::Stable);
    }

    #[test]
    fn throughput_metric_is_upper_is_better() {
        let monitor = seeded_monitor(1);
        monitor.record("orders_filled_per_min", 10.0, "warmup");
        let report = monitor.record("orders_filled_per_min", 4.0, "poll").unwrap();
        assert_eq!(report.status, Status::Critical);
        let improved = monitor.record("orders_filled_per_min", 11.0, "poll");
        assert!(improved.is_none() || matches!(improved.unwrap().status, Status::Stable));
    }

    #[test]
    fn eviction_drops_samples_past_retention() {
        let monitor = seeded_monitor(1000);
        monitor.record("memory_usage_mb", 100.0, "warmup");
        monitor.evict_expired(Utc::now() + Duration::days(31));
        assert!(monitor.samples_for("memory_usage_mb").is_empty());
    }

    #[test]
    fn established_baseline_survives_a_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline_metrics.json");

        let monitor = seeded_monitor(1);
        monitor.record("pattern_detector_latency_ms", 50.0, "warmup");
        monitor.export_snapshot(&path).unwrap();

        let reloaded = BaselineMonitor::with_snapshot(MonitorConfig::default(), &path);
        let baseline = reloaded.baseline_for("pattern_detector_latency_ms").unwrap();
        assert!((baseline.value - 50.0).abs() < 1e-9);
    }
}
