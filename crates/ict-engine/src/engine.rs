use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use analysis_scheduler::{AnalysisTask, Scheduler, SchedulerConfig};
use baseline_monitor::{BaselineMonitor, ComponentTimer};
use broker_trait::{OrderSide, SharedBroker};
use chrono::{DateTime, NaiveDate, Utc};
use ict_core::{pip_size, Bar, Direction, Timeframe};
use memory_store::{HistoricalMemoryStore, UnifiedMemorySystem};
use mtf_validator::{H4Context, M15Context};
use pattern_detectors::{dedup_patterns, structure, swing};
use pattern_orchestrator::{OrchestratorConfig, PatternOrchestrator};
use risk_pipeline::{EquitySample, RiskContext, StaticCorrelationMatrix, TradeSignal};

use crate::config::EngineConfig;

const ATR_LOOKBACK: usize = 14;

/// Per-symbol bar window fetched for one cycle: enough history for the
/// slowest detector plus the H4/M15 context windows MTF validation needs.
fn bars_to_fetch(timeframe: Timeframe) -> usize {
    match timeframe {
        Timeframe::H4 | Timeframe::D1 => 200,
        Timeframe::M15 | Timeframe::H1 => 300,
        Timeframe::M1 | Timeframe::M5 => 500,
    }
}

/// Average true range over the last `lookback` bars, same running-sum shape
/// as the displacement detector's inline ATR.
fn average_true_range(bars: &[Bar], lookback: usize) -> f64 {
    if bars.len() <= lookback {
        return 0.0;
    }
    let start = bars.len() - lookback;
    bars[start..].iter().map(|b| b.high - b.low).sum::<f64>() / lookback as f64
}

/// Rolling account/signal bookkeeping the Risk Pipeline needs (§4.6's
/// `RiskContext` fields) that no other component owns.
struct RiskState {
    equity_history: Vec<EquitySample>,
    last_signal_at: HashMap<String, DateTime<Utc>>,
    day_start_balance: f64,
    day_start_date: Option<NaiveDate>,
}

impl RiskState {
    fn new() -> Self {
        Self {
            equity_history: Vec::new(),
            last_signal_at: HashMap::new(),
            day_start_balance: 0.0,
            day_start_date: None,
        }
    }
}

/// Wires every ICT engine component together and drives one analysis/risk/
/// execution cycle per call to `run_cycle`. Grounded on `trading-agent`'s
/// component-struct-plus-`main.rs`-loop shape, generalized from its
/// Alpaca-specific fields to the broker trait.
pub struct Engine {
    config: EngineConfig,
    broker: SharedBroker,
    memory: Arc<UnifiedMemorySystem>,
    scheduler: Arc<Scheduler>,
    baseline: Arc<BaselineMonitor>,
    orchestrator: Arc<PatternOrchestrator>,
    execution: Arc<execution_router::ExecutionRouter>,
    correlation: StaticCorrelationMatrix,
    risk: tokio::sync::Mutex<RiskState>,
    next_task_id: AtomicU64,
    baseline_path: PathBuf,
}

impl Engine {
    pub fn build(config: EngineConfig, data_dir: &std::path::Path, broker: SharedBroker) -> anyhow::Result<Self> {
        let memory_path = data_dir.join("memory").join("historical_analysis_cache.json");
        let store = Arc::new(HistoricalMemoryStore::new(config.memory.clone(), memory_path));
        let memory = Arc::new(UnifiedMemorySystem::new(store));

        let scheduler_config = SchedulerConfig {
            configured_pool_size: config.scheduler.pool_size,
            logical_cpus: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            min_bars: analysis_scheduler::task::DEFAULT_MIN_BARS,
            max_retries: config.scheduler.max_retries,
            max_queue: config.scheduler.max_queue,
            task_timeout: std::time::Duration::from_secs(config.scheduler.task_timeout_sec),
        };
        let scheduler = Arc::new(Scheduler::new(scheduler_config, config.pattern_detectors.clone()));

        let baseline_path = data_dir.join("metrics").join("baseline_metrics.json");
        let baseline = Arc::new(BaselineMonitor::with_snapshot(config.baseline.clone(), &baseline_path));

        let orchestrator = Arc::new(PatternOrchestrator::new(OrchestratorConfig::default()));

        let journal_path = data_dir
            .join("journal")
            .join(format!("trades_{}.jsonl", Utc::now().format("%Y%m%d")));
        let positions_path = data_dir.join("status").join("active_positions.json");
        let execution = Arc::new(execution_router::ExecutionRouter::new(
            broker.clone(),
            execution_router::ExecutionConfig {
                submit_timeout: std::time::Duration::from_secs(config.engine.submit_timeout_sec),
                lot_step: config.engine.lot_step,
            },
            journal_path,
            positions_path,
        ));

        Ok(Self {
            config,
            broker,
            memory,
            scheduler,
            baseline,
            orchestrator,
            execution,
            correlation: StaticCorrelationMatrix::default(),
            risk: tokio::sync::Mutex::new(RiskState::new()),
            next_task_id: AtomicU64::new(1),
            baseline_path,
        })
    }

    /// One full pass over the watchlist: refresh equity bookkeeping, run
    /// detection/memory/MTF validation per symbol, and route anything the
    /// Risk Pipeline approves.
    pub async fn run_cycle(self: &Arc<Self>) -> anyhow::Result<()> {
        let _timer = ComponentTimer::start(&self.baseline, "engine", "run_cycle");
        let account = self.broker.account_snapshot().await?;
        let now = Utc::now();

        {
            let mut risk = self.risk.lock().await;
            let today = now.date_naive();
            if risk.day_start_date != Some(today) {
                risk.day_start_balance = account.balance;
                risk.day_start_date = Some(today);
            }
            risk.equity_history.push(EquitySample {
                timestamp: now,
                equity: account.equity,
            });
            risk.equity_history.retain(|s| (now - s.timestamp).num_hours() <= 24);
        }

        // Retention sweeps: these own no timer of their own, so run_cycle's
        // cadence is what bounds the baseline sample vectors, the historical
        // memory store's outcome log, and the scheduler's TTL cache.
        self.baseline.evict_expired(now);
        self.memory.store().retain_within_lookback(now);
        self.scheduler.cache.sweep_expired();

        for symbol in self.config.engine.watchlist.clone() {
            if let Err(e) = self.analyze_symbol(&symbol, &account, now).await {
                tracing::warn!(symbol = %symbol, error = %e, "cycle analysis failed for symbol");
            }
        }

        Ok(())
    }

    async fn analyze_symbol(
        self: &Arc<Self>,
        symbol: &str,
        account: &ict_core::AccountSnapshot,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let timeframes = self.config.engine.timeframes.clone();
        let mut tasks = Vec::with_capacity(timeframes.len());
        let mut bars_by_tf: HashMap<Timeframe, Arc<Vec<Bar>>> = HashMap::new();

        for tf in &timeframes {
            let bars = self.broker.fetch_bars(symbol, *tf, bars_to_fetch(*tf)).await?;
            let bars = Arc::new(bars);
            bars_by_tf.insert(*tf, Arc::clone(&bars));
            let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
            tasks.push(AnalysisTask {
                id: task_id,
                symbol: symbol.to_string(),
                timeframe: *tf,
                bars,
                priority: 0,
                kind_filter: std::collections::HashSet::new(),
            });
        }

        let outcomes = self.scheduler.run_batch(tasks).await;

        let h4_context = bars_by_tf.get(&Timeframe::H4).and_then(|bars| {
            structure::detect_structure(bars, symbol, Timeframe::H4, &self.config.pattern_detectors)
                .into_iter()
                .max_by_key(|p| p.common().origin_bar_index)
                .map(|p| H4Context {
                    trend: p.common().direction,
                })
        });
        let m15_arena = bars_by_tf
            .get(&Timeframe::M15)
            .map(|bars| swing::detect_swings(bars, self.config.pattern_detectors.swing_window));
        let m15_atr = bars_by_tf
            .get(&Timeframe::M15)
            .map(|bars| average_true_range(bars, ATR_LOOKBACK))
            .unwrap_or(0.0);
        let m15_context = m15_arena.as_ref().map(|arena| M15Context { arena, atr: m15_atr });

        let mut all_patterns = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(patterns) => all_patterns.extend(patterns),
                Err(e) => tracing::warn!(symbol, error = %e, "analysis task failed"),
            }
        }

        // MTF validation runs first so its confluence bonus can feed
        // `enhance`'s `structural_bonus` term; memory enhancement is the
        // authoritative last write to `enhanced_confidence` (§4.2).
        let mut validated = Vec::with_capacity(all_patterns.len());
        for mut pattern in all_patterns {
            let validation = mtf_validator::validate(
                &mut pattern,
                h4_context.as_ref(),
                m15_context.as_ref(),
                now,
                &self.config.mtf_validator,
            );
            let (pattern, _enhancement) = self.memory.enhance(pattern, validation.bonus);
            validated.push(pattern);
        }
        let deduped = dedup_patterns(validated);
        let deduped_for_lookup = deduped.clone();

        let view = self
            .orchestrator
            .consolidated_view(symbol, &timeframes, move || deduped);

        let Some(best) = view.best_overall_setup.clone() else {
            return Ok(());
        };
        let is_high_confidence = view
            .high_confidence_patterns
            .iter()
            .any(|s| s.kind == best.kind && s.timeframe == best.timeframe);
        if !is_high_confidence {
            return Ok(());
        }

        let Some(pattern) = deduped_for_lookup
            .iter()
            .find(|p| p.kind() == best.kind && p.common().timeframe == best.timeframe)
        else {
            return Ok(());
        };

        let Some(entry_price) = bars_by_tf.get(&best.timeframe).and_then(|b| b.last()).map(|b| b.close) else {
            return Ok(());
        };

        // Stop-loss: opposite side of the pattern's own price zone plus a
        // fixed pip buffer. No literal formula is named for this; authored
        // extension recorded in DESIGN.md.
        let zone = pattern.common().price_zone;
        let pip = pip_size(symbol);
        let stop_loss = match best.direction {
            Direction::Bullish => zone.low - 5.0 * pip,
            Direction::Bearish => zone.high + 5.0 * pip,
        };

        self.submit_signal(symbol, &best, account, entry_price, stop_loss, now).await
    }

    async fn submit_signal(
        self: &Arc<Self>,
        symbol: &str,
        best: &pattern_orchestrator::SetupSummary,
        account: &ict_core::AccountSnapshot,
        entry_price: f64,
        stop_loss: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let positions = self.broker.positions().await?;

        let decision = {
            let risk = self.risk.lock().await;
            let ctx = RiskContext {
                open_positions: &positions,
                day_start_balance: risk.day_start_balance,
                equity: account.equity,
                equity_history: &risk.equity_history,
                last_signal_at: &risk.last_signal_at,
                now,
            };
            let signal = TradeSignal {
                symbol,
                account_balance: account.balance,
                risk_percent: self.config.risk_policy.max_risk_per_trade_pct,
                entry_price,
                stop_loss,
                pattern_confidence: best.confidence,
            };
            risk_pipeline::pipeline::evaluate(&signal, &ctx, &self.correlation, &self.config.risk_policy)
        };

        if !decision.approved {
            tracing::info!(symbol, stage = %decision.stage, reasons = ?decision.reasons, "signal rejected by risk pipeline");
            return Ok(());
        }

        let side = match best.direction {
            Direction::Bullish => OrderSide::Buy,
            Direction::Bearish => OrderSide::Sell,
        };
        match self.execution.route(symbol, side, &decision, Some(stop_loss), None).await {
            Ok(outcome) => {
                tracing::info!(symbol, client_order_id = %outcome.client_order_id, state = ?outcome.state, "routed approved signal");
                self.risk.lock().await.last_signal_at.insert(symbol.to_string(), now);
            }
            Err(e) => tracing::warn!(symbol, error = %e, "execution router failed to route approved signal"),
        }
        Ok(())
    }

    /// Flush in-memory state to the persisted-state tree (§6) on shutdown.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.memory.store().export_snapshot()?;
        self.baseline.export_snapshot(&self.baseline_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_trait::mock::MockBroker;
    use chrono::Duration as ChronoDuration;
    use ict_core::AccountSnapshot;

    fn account() -> AccountSnapshot {
        AccountSnapshot {
            balance: 10_000.0,
            equity: 10_000.0,
            margin: 0.0,
            profit: 0.0,
        }
    }

    /// Flat-ish random-walk bar stream, long enough for any `bars_to_fetch`
    /// window this test's timeframe needs.
    fn synthetic_bars(count: usize) -> Vec<Bar> {
        let start = Utc::now() - ChronoDuration::minutes(15 * count as i64);
        let mut price = 1.1000;
        (0..count)
            .map(|i| {
                let drift = ((i % 7) as f64 - 3.0) * 0.0002;
                price += drift;
                Bar {
                    timestamp: start + ChronoDuration::minutes(15 * i as i64),
                    open: price,
                    high: price + 0.0010,
                    low: price - 0.0010,
                    close: price + drift / 2.0,
                    volume: 100.0,
                }
            })
            .collect()
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            engine: crate::config::EngineSettings {
                watchlist: vec!["EURUSD".to_string()],
                timeframes: vec![Timeframe::M15, Timeframe::H4],
                ..crate::config::EngineSettings::default()
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn bars_to_fetch_covers_every_timeframe_tier() {
        assert_eq!(bars_to_fetch(Timeframe::H4), 200);
        assert_eq!(bars_to_fetch(Timeframe::D1), 200);
        assert_eq!(bars_to_fetch(Timeframe::M15), 300);
        assert_eq!(bars_to_fetch(Timeframe::H1), 300);
        assert_eq!(bars_to_fetch(Timeframe::M1), 500);
        assert_eq!(bars_to_fetch(Timeframe::M5), 500);
    }

    #[test]
    fn atr_is_zero_with_insufficient_history() {
        let bars = synthetic_bars(10);
        assert_eq!(average_true_range(&bars, 14), 0.0);
    }

    #[test]
    fn atr_averages_high_low_range_over_the_lookback_window() {
        let bars = synthetic_bars(20);
        let atr = average_true_range(&bars, 14);
        assert!((atr - 0.0020).abs() < 1e-9);
    }

    #[tokio::test]
    async fn run_cycle_completes_against_a_mock_broker_without_tripping() {
        let dir = tempfile::tempdir().unwrap();
        let broker: SharedBroker = Arc::new(MockBroker::new(account()).with_bars(synthetic_bars(400)));
        let engine = Arc::new(Engine::build(test_config(), dir.path(), broker).unwrap());

        engine.run_cycle().await.unwrap();
        engine.shutdown().unwrap();

        assert!(dir.path().join("metrics").join("baseline_metrics.json").exists());
    }

    #[tokio::test]
    async fn run_cycle_is_a_no_op_on_an_empty_watchlist() {
        let dir = tempfile::tempdir().unwrap();
        let broker: SharedBroker = Arc::new(MockBroker::new(account()));
        let mut config = test_config();
        config.engine.watchlist.clear();
        let engine = Arc::new(Engine::build(config, dir.path(), broker).unwrap());

        engine.run_cycle().await.unwrap();
    }
}
