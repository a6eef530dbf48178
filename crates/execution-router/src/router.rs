use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use broker_trait::{BrokerAdapter, OrderRequest, OrderResult, OrderSide, OrderStatus, SharedBroker};
use chrono::Utc;
use ict_core::ExecutionError;
use risk_pipeline::RiskDecision;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::journal::{TradeJournal, TradeJournalEntry};
use crate::state::OrderState;

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// How long to wait on a single `submit_order` call before giving up
    /// and reporting `TimedOut` (§4.8 — never retried automatically).
    pub submit_timeout: Duration,
    /// Final lot rounding step; mirrors the broker's own lot step, applied
    /// again here as defense in depth ahead of submission.
    pub lot_step: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(10),
            lot_step: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingOrder {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub lots: f64,
    pub state: OrderState,
}

#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub client_order_id: String,
    pub state: OrderState,
    pub order_result: Option<OrderResult>,
}

/// Drives an approved `RiskDecision` through `Received -> Validated -> Sized
/// -> Submitted -> {Filled|Rejected|TimedOut}` (§4.8), journaling every
/// terminal state and keeping an atomic positions snapshot current.
pub struct ExecutionRouter {
    broker: SharedBroker,
    config: ExecutionConfig,
    journal: TradeJournal,
    positions_path: PathBuf,
    pending: Mutex<HashMap<String, PendingOrder>>,
    sequence: AtomicU64,
}

fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}

impl ExecutionRouter {
    pub fn new(
        broker: SharedBroker,
        config: ExecutionConfig,
        journal_path: impl Into<PathBuf>,
        positions_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            broker,
            config,
            journal: TradeJournal::new(journal_path),
            positions_path: positions_path.into(),
            pending: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn pending_orders(&self) -> Vec<PendingOrder> {
        self.pending.lock().await.values().cloned().collect()
    }

    fn next_client_order_id(&self, symbol: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{symbol}-{}-{seq}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }

    /// Route one approved decision to the broker. `decision.approved` must
    /// already be true; callers that hold a rejected `RiskDecision` should
    /// never call this (there is nothing to execute).
    pub async fn route(
        &self,
        symbol: &str,
        side: OrderSide,
        decision: &RiskDecision,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<RouteOutcome, ExecutionError> {
        // Received
        tracing::debug!(symbol, lots = decision.lots, "signal received for execution");

        // Validated: defense-in-depth re-check plus a broker connectivity probe.
        if !decision.approved {
            return Err(ExecutionError::Broker("decision not approved".to_string()));
        }
        self.broker
            .account_snapshot()
            .await
            .map_err(|e| ExecutionError::Broker(e.to_string()))?;

        // Sized: final lot rounding.
        let lots = round_to_step(decision.lots, self.config.lot_step);

        // Submitted
        let client_order_id = self.next_client_order_id(symbol);
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                client_order_id.clone(),
                PendingOrder {
                    client_order_id: client_order_id.clone(),
                    symbol: symbol.to_string(),
                    side,
                    lots,
                    state: OrderState::Submitted,
                },
            );
        }

        let mut request = OrderRequest::market(client_order_id.clone(), symbol, side, lots);
        request.stop_loss = stop_loss;
        request.take_profit = take_profit;

        let submit = self.broker.submit_order(request);
        let outcome = match tokio::time::timeout(self.config.submit_timeout, submit).await {
            Ok(Ok(result)) => self.on_broker_response(&client_order_id, symbol, side, lots, result).await,
            Ok(Err(e)) => {
                self.finish(&client_order_id, symbol, side, lots, OrderState::Rejected, Some(e.to_string()))
                    .await;
                return Err(ExecutionError::Broker(e.to_string()));
            }
            Err(_) => {
                // Best-effort cancellation; the order may still fill on the
                // broker side, hence "explicit operator retry required"
                // rather than an automatic resubmit.
                let _ = self.broker.cancel_order(&client_order_id).await;
                self.finish(&client_order_id, symbol, side, lots, OrderState::TimedOut, None)
                    .await;
                return Err(ExecutionError::TimedOut);
            }
        };

        Ok(outcome)
    }

    async fn on_broker_response(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: OrderSide,
        lots: f64,
        result: OrderResult,
    ) -> RouteOutcome {
        let state = match result.status {
            OrderStatus::Filled => OrderState::Filled,
            OrderStatus::Rejected => OrderState::Rejected,
            OrderStatus::Submitted => OrderState::Submitted,
            OrderStatus::TimedOut => OrderState::TimedOut,
        };
        self.finish(client_order_id, symbol, side, lots, state, result.reason.clone()).await;
        RouteOutcome {
            client_order_id: client_order_id.to_string(),
            state,
            order_result: Some(result),
        }
    }

    async fn finish(
        &self,
        client_order_id: &str,
        symbol: &str,
        side: OrderSide,
        lots: f64,
        state: OrderState,
        reason: Option<String>,
    ) {
        {
            let mut pending = self.pending.lock().await;
            if state.is_terminal() {
                pending.remove(client_order_id);
            } else if let Some(entry) = pending.get_mut(client_order_id) {
                entry.state = state;
            }
        }
        let entry = TradeJournalEntry {
            timestamp: Utc::now(),
            client_order_id: client_order_id.to_string(),
            symbol: symbol.to_string(),
            side,
            lots,
            state,
            reason,
        };
        if let Err(e) = self.journal.record(&entry) {
            tracing::error!(symbol, error = %e, "failed to append trade journal entry");
        }
        // Positions snapshot on every state transition (§4.8), not just the
        // success path: Rejected/TimedOut change the broker's open-position
        // set just as much as a Filled order does.
        self.snapshot_positions().await;
    }

    async fn snapshot_positions(&self) {
        match self.broker.positions().await {
            Ok(positions) => {
                if let Err(e) = ict_core::snapshot::write_json_atomic(&self.positions_path, &positions) {
                    tracing::error!(error = %e, "failed to write positions snapshot");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to fetch positions for snapshot"),
        }
    }
}

/// Test-only broker that either errors on submit or stalls past the
/// router's `submit_timeout`, so the `Ok(Err(e))` and `Err(_)` arms of
/// `route`'s match (neither reachable via `MockBroker::reject_next`, which
/// only ever produces a successful `Rejected` `OrderResult`) get real
/// coverage.
#[cfg(test)]
struct FlakyBroker {
    fail_submit: bool,
    stall: Option<Duration>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl BrokerAdapter for FlakyBroker {
    async fn fetch_bars(
        &self,
        _symbol: &str,
        _timeframe: ict_core::Timeframe,
        _count: usize,
    ) -> anyhow::Result<Vec<ict_core::Bar>> {
        Ok(Vec::new())
    }

    async fn subscribe_bars(
        &self,
        _symbols: &[String],
        _timeframes: &[ict_core::Timeframe],
    ) -> anyhow::Result<tokio::sync::mpsc::Receiver<broker_trait::BarUpdate>> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        Ok(rx)
    }

    async fn account_snapshot(&self) -> anyhow::Result<ict_core::AccountSnapshot> {
        Ok(ict_core::AccountSnapshot {
            balance: 10_000.0,
            equity: 10_000.0,
            margin: 0.0,
            profit: 0.0,
        })
    }

    async fn submit_order(&self, req: OrderRequest) -> anyhow::Result<OrderResult> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if self.fail_submit {
            return Err(anyhow::anyhow!("flaky broker unreachable"));
        }
        Ok(OrderResult {
            client_order_id: req.client_order_id,
            broker_order_id: None,
            status: OrderStatus::Filled,
            filled_price: Some(1.0),
            filled_volume: Some(req.volume),
            reason: None,
        })
    }

    async fn positions(&self) -> anyhow::Result<Vec<ict_core::OpenPosition>> {
        Ok(Vec::new())
    }

    async fn cancel_order(&self, _client_order_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "flaky"
    }
}
