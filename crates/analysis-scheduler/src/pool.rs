use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ict_core::{Pattern, SchedulerError, Timeframe};
use pattern_detectors::PatternDetectorConfig;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;

use crate::cache::SharedMemoryOptimizer;
use crate::dispatch::{choose_worker, find_imbalance};
use crate::task::{estimate_time, validate_task, AnalysisTask};
use crate::worker::{pool_size, round_robin_specialties, WorkerState};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub configured_pool_size: usize,
    pub logical_cpus: usize,
    pub min_bars: usize,
    pub max_retries: u32,
    /// Backpressure bound (§5): a `run_batch` call rejects any tasks past
    /// this count with `SchedulerError::QueueFull` instead of running them.
    pub max_queue: usize,
    /// Per-task wall-clock budget (§5, §4.4). A task that exceeds this is
    /// failed immediately with `SchedulerError::Timeout`, not retried — an
    /// unresponsive worker is assumed stuck, not transiently failed.
    pub task_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            configured_pool_size: 8,
            logical_cpus: num_cpus_fallback(),
            min_bars: crate::task::DEFAULT_MIN_BARS,
            max_retries: 3,
            max_queue: 32,
            task_timeout: Duration::from_secs(30),
        }
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

pub struct TaskOutcome {
    pub task_id: u64,
    pub result: Result<Vec<Pattern>, SchedulerError>,
}

/// Detector Pool / Work Scheduler (F): owns worker bookkeeping behind a
/// single async mutex (the "one scheduler thread owns the task queue and
/// worker bookkeeping" model), fans work out with a `JoinSet` per stream
/// (grounded on `analysis-orchestrator/src/screener.rs`'s `StockScreener`)
/// and keeps FIFO order within a (symbol, timeframe) stream while running
/// independent streams concurrently.
pub struct Scheduler {
    workers: AsyncMutex<Vec<WorkerState>>,
    avg_task_time: AsyncMutex<f64>,
    config: SchedulerConfig,
    detector_config: PatternDetectorConfig,
    pub cache: Arc<SharedMemoryOptimizer>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, detector_config: PatternDetectorConfig) -> Self {
        let size = pool_size(config.configured_pool_size, config.logical_cpus);
        let specialties = round_robin_specialties(size);
        let workers = specialties
            .into_iter()
            .enumerate()
            .map(|(id, s)| WorkerState::new(id, s))
            .collect();
        Self {
            workers: AsyncMutex::new(workers),
            avg_task_time: AsyncMutex::new(1.0),
            config,
            detector_config,
            cache: Arc::new(SharedMemoryOptimizer::new()),
        }
    }

    pub fn worker_count(&self) -> usize {
        pool_size(self.config.configured_pool_size, self.config.logical_cpus)
    }

    /// Submit and run a batch of tasks. Streams (symbol, timeframe) process
    /// their tasks in submission order; distinct streams run concurrently.
    ///
    /// Backpressure (§5): tasks past `max_queue` are rejected synchronously
    /// with `queue_full` rather than queued or run.
    pub async fn run_batch(self: &Arc<Self>, tasks: Vec<AnalysisTask>) -> Vec<TaskOutcome> {
        let mut out = Vec::new();
        let (tasks, overflow) = if tasks.len() > self.config.max_queue {
            let mut tasks = tasks;
            let overflow = tasks.split_off(self.config.max_queue);
            (tasks, overflow)
        } else {
            (tasks, Vec::new())
        };
        for task in &overflow {
            tracing::warn!(task_id = task.id, max_queue = self.config.max_queue, "queue full, rejecting task");
            out.push(TaskOutcome {
                task_id: task.id,
                result: Err(SchedulerError::QueueFull),
            });
        }

        let mut streams: HashMap<(String, Timeframe), Vec<AnalysisTask>> = HashMap::new();
        let mut order: Vec<(String, Timeframe)> = Vec::new();
        for task in tasks {
            let key = task.stream_key();
            if !streams.contains_key(&key) {
                order.push(key.clone());
            }
            streams.entry(key).or_default().push(task);
        }

        let mut joins = JoinSet::new();
        for key in order {
            let Some(stream_tasks) = streams.remove(&key) else {
                continue;
            };
            let scheduler = Arc::clone(self);
            joins.spawn(async move { scheduler.run_stream(stream_tasks).await });
        }

        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok(mut results) => out.append(&mut results),
                Err(e) => tracing::error!(error = %e, "scheduler stream task panicked"),
            }
        }
        out
    }

    async fn run_stream(self: Arc<Self>, tasks: Vec<AnalysisTask>) -> Vec<TaskOutcome> {
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            out.push(self.run_one(task).await);
        }
        out
    }

    async fn run_one(&self, task: AnalysisTask) -> TaskOutcome {
        let task_id = task.id;
        if let Err(e) = validate_task(&task, self.config.min_bars) {
            return TaskOutcome {
                task_id,
                result: Err(e),
            };
        }

        let estimated = estimate_time(&task);
        let mut retry_count = 0u32;
        loop {
            let worker_idx = {
                let mut workers = self.workers.lock().await;
                let avg = *self.avg_task_time.lock().await;
                let idx = choose_worker(&workers, &task, estimated, avg)
                    .expect("pool has at least one worker");
                workers[idx].current_load += estimated;
                idx
            };

            let timed_out = match tokio::time::timeout(self.config.task_timeout, self.execute_on_worker(&task)).await {
                Ok(outcome) => Some(outcome),
                Err(_elapsed) => None,
            };

            {
                let mut workers = self.workers.lock().await;
                workers[worker_idx].current_load = (workers[worker_idx].current_load - estimated).max(0.0);
                match &timed_out {
                    Some(Ok(_)) => workers[worker_idx].perf_score = (workers[worker_idx].perf_score + 0.05).min(2.0),
                    _ => workers[worker_idx].perf_score = (workers[worker_idx].perf_score - 0.1).max(0.0),
                }
                if let Some((overloaded, underloaded)) = find_imbalance(&workers) {
                    let shift = (workers[overloaded].current_load - workers[underloaded].current_load) / 2.0;
                    workers[overloaded].current_load -= shift;
                    workers[underloaded].current_load += shift;
                    tracing::debug!(overloaded, underloaded, shift, "migrated load between workers");
                }
                let mut avg = self.avg_task_time.lock().await;
                *avg = (*avg * 0.9) + (estimated * 0.1);
            }

            // A timed-out worker is treated as stuck, not transiently
            // failed (§5): fail immediately, no retry.
            let Some(outcome) = timed_out else {
                tracing::warn!(task_id, worker = worker_idx, timeout = ?self.config.task_timeout, "task timed out, recycling worker");
                return TaskOutcome {
                    task_id,
                    result: Err(SchedulerError::Timeout(self.config.task_timeout)),
                };
            };

            match outcome {
                Ok(patterns) => {
                    return TaskOutcome {
                        task_id,
                        result: Ok(patterns),
                    }
                }
                Err(e) => {
                    if retry_count >= self.config.max_retries {
                        return TaskOutcome {
                            task_id,
                            result: Err(SchedulerError::PermanentFailure {
                                retries: retry_count,
                                reason: e.to_string(),
                            }),
                        };
                    }
                    retry_count += 1;
                    let backoff = Duration::from_millis(50 * 2u64.pow(retry_count));
                    tracing::warn!(task_id, retry_count, ?backoff, "task failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn execute_on_worker(&self, task: &AnalysisTask) -> Result<Vec<Pattern>, ict_core::DetectorError> {
        let bars = Arc::clone(&task.bars);
        let symbol = task.symbol.clone();
        let timeframe = task.timeframe;
        let kind_filter = task.kind_filter.clone();
        let cfg = self.detector_config.clone();
        tokio::task::spawn_blocking(move || {
            let filter = if kind_filter.is_empty() {
                None
            } else {
                Some(&kind_filter)
            };
            pattern_detectors::detect_all(&bars, &symbol, timeframe, filter, &cfg)
        })
        .await
        .unwrap_or_else(|e| Err(ict_core::DetectorError::InvalidBar(format!("worker panicked: {e}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;

    fn bars(n: usize) -> Vec<ict_core::Bar> {
        (0..n)
            .map(|i| ict_core::Bar {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open: 1.1000,
                high: 1.1005,
                low: 1.0995,
                close: 1.1002,
                volume: 1.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn runs_a_single_valid_task() {
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig {
                configured_pool_size: 2,
                logical_cpus: 4,
                ..SchedulerConfig::default()
            },
            PatternDetectorConfig::default(),
        ));
        let task = AnalysisTask {
            id: 1,
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M15,
            bars: Arc::new(bars(60)),
            priority: 0,
            kind_filter: HashSet::new(),
        };
        let results = scheduler.run_batch(vec![task]).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].result.is_ok());
    }

    #[tokio::test]
    async fn invalid_task_is_rejected_without_retry() {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default(), PatternDetectorConfig::default()));
        let task = AnalysisTask {
            id: 2,
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M15,
            bars: Arc::new(Vec::new()),
            priority: 0,
            kind_filter: HashSet::new(),
        };
        let results = scheduler.run_batch(vec![task]).await;
        assert!(matches!(results[0].result, Err(SchedulerError::InvalidTask(_))));
    }

    #[tokio::test]
    async fn two_streams_both_complete() {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default(), PatternDetectorConfig::default()));
        let t1 = AnalysisTask {
            id: 1,
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M15,
            bars: Arc::new(bars(60)),
            priority: 0,
            kind_filter: HashSet::new(),
        };
        let t2 = AnalysisTask {
            id: 2,
            symbol: "GBPUSD".to_string(),
            timeframe: Timeframe::H1,
            bars: Arc::new(bars(60)),
            priority: 0,
            kind_filter: HashSet::new(),
        };
        let results = scheduler.run_batch(vec![t1, t2]).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.result.is_ok()));
    }

    #[tokio::test]
    async fn tasks_past_max_queue_are_rejected_synchronously() {
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig {
                max_queue: 1,
                ..SchedulerConfig::default()
            },
            PatternDetectorConfig::default(),
        ));
        let t1 = AnalysisTask {
            id: 1,
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M15,
            bars: Arc::new(bars(60)),
            priority: 0,
            kind_filter: HashSet::new(),
        };
        let t2 = AnalysisTask {
            id: 2,
            symbol: "GBPUSD".to_string(),
            timeframe: Timeframe::M15,
            bars: Arc::new(bars(60)),
            priority: 0,
            kind_filter: HashSet::new(),
        };
        let results = scheduler.run_batch(vec![t1, t2]).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .any(|r| matches!(r.result, Err(SchedulerError::QueueFull))));
        assert!(results.iter().any(|r| r.result.is_ok()));
    }

    #[tokio::test]
    async fn a_task_past_its_timeout_fails_without_retrying() {
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig {
                task_timeout: Duration::from_nanos(1),
                max_retries: 5,
                ..SchedulerConfig::default()
            },
            PatternDetectorConfig::default(),
        ));
        let task = AnalysisTask {
            id: 3,
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::M15,
            bars: Arc::new(bars(60)),
            priority: 0,
            kind_filter: HashSet::new(),
        };
        let results = scheduler.run_batch(vec![task]).await;
        assert!(matches!(results[0].result, Err(SchedulerError::Timeout(_))));
    }
}
