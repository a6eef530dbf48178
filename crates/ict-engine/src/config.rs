use std::path::PathBuf;

use baseline_monitor::MonitorConfig;
use ict_core::Timeframe;
use memory_store::MemoryConfig;
use mtf_validator::ValidatorConfig;
use pattern_detectors::PatternDetectorConfig;
use risk_pipeline::RiskPolicy;
use serde::{Deserialize, Serialize};

/// `scheduler` config section (§6). Kept as its own struct rather than
/// reusing `analysis_scheduler::SchedulerConfig` directly since this one
/// is TOML/serde-facing (field names and defaults match §5/§6 verbatim);
/// `Engine::build` translates it into `analysis_scheduler::SchedulerConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    #[serde(default = "default_task_timeout_sec")]
    pub task_timeout_sec: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_pool_size() -> usize {
    8
}
/// §5: "default = pool_size × 4" against the default pool size of 8.
fn default_max_queue() -> usize {
    32
}
fn default_task_timeout_sec() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_queue: default_max_queue(),
            task_timeout_sec: default_task_timeout_sec(),
            max_retries: default_max_retries(),
        }
    }
}

/// Engine-level knobs that sit outside the per-component config sections
/// named in §6: watchlist, timeframe set, data directory layout (§6's
/// `memory/`, `metrics/`, `status/`, `journal/`, `reports/` tree), and the
/// execution router's submit timeout/lot step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "default_submit_timeout_sec")]
    pub submit_timeout_sec: u64,
    #[serde(default = "default_lot_step")]
    pub lot_step: f64,
    #[serde(default = "default_shutdown_timeout_sec")]
    pub shutdown_timeout_sec: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_watchlist() -> Vec<String> {
    vec!["EURUSD".to_string(), "GBPUSD".to_string(), "XAUUSD".to_string()]
}
fn default_timeframes() -> Vec<Timeframe> {
    vec![Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::H4]
}
fn default_submit_timeout_sec() -> u64 {
    10
}
fn default_lot_step() -> f64 {
    0.01
}
fn default_shutdown_timeout_sec() -> u64 {
    10
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            watchlist: default_watchlist(),
            timeframes: default_timeframes(),
            submit_timeout_sec: default_submit_timeout_sec(),
            lot_step: default_lot_step(),
            shutdown_timeout_sec: default_shutdown_timeout_sec(),
        }
    }
}

/// Top-level configuration tree (§6's exhaustive config table), one
/// sub-struct per config section. Every sub-struct is independently
/// `Default`-able and `#[serde(default)]`-backed so a partial TOML file —
/// or none at all — still produces a fully populated config, in the
/// teacher's `RiskParameters`-style field-level-fallback pattern.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub risk_policy: RiskPolicy,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub baseline: MonitorConfig,
    #[serde(default)]
    pub pattern_detectors: PatternDetectorConfig,
    #[serde(default)]
    pub mtf_validator: ValidatorConfig,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl EngineConfig {
    /// Load from a TOML file if `path` exists; otherwise fall back to
    /// built-in defaults (§6: "no environment variables are required by
    /// the core; all knobs live in config").
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "no config file found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Apply the two recognized test-mode env flags (§6). `LOW_MEM_MODE`
    /// shrinks in-memory caches (scheduler pool size, baseline retention);
    /// `QUICK_TEST_MODE` lowers `min_samples` and skips the startup bar
    /// prefetch's full history window.
    pub fn apply_env_overrides(&mut self) {
        if env_flag_set("LOW_MEM_MODE") {
            self.scheduler.pool_size = (self.scheduler.pool_size / 2).max(1);
            self.baseline.retention_days = self.baseline.retention_days.min(7);
            tracing::info!("LOW_MEM_MODE active: shrinking scheduler pool and baseline retention");
        }
        if env_flag_set("QUICK_TEST_MODE") {
            self.memory.min_samples = 1;
            tracing::info!("QUICK_TEST_MODE active: min_samples lowered, heavy init skipped");
        }
    }

    pub fn quick_test_mode() -> bool {
        env_flag_set("QUICK_TEST_MODE")
    }
}

fn env_flag_set(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
