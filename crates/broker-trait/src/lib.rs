use std::sync::Arc;

use async_trait::async_trait;
use ict_core::{AccountSnapshot, Bar, OpenPosition, Timeframe};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Idempotency key minted by the caller, not the broker — lets the
    /// Execution Router reconcile a position after a submit timeout even
    /// if the broker's response never arrives (§4.8).
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: f64,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub comment: Option<String>,
    pub magic: Option<i64>,
}

impl OrderRequest {
    pub fn market(client_order_id: impl Into<String>, symbol: impl Into<String>, side: OrderSide, volume: f64) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            volume,
            order_type: OrderType::Market,
            limit_price: None,
            stop_loss: None,
            take_profit: None,
            comment: None,
            magic: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    Filled,
    Rejected,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub client_order_id: String,
    pub broker_order_id: Option<String>,
    pub status: OrderStatus,
    pub filled_price: Option<f64>,
    pub filled_volume: Option<f64>,
    pub reason: Option<String>,
}

/// Pushed per newly closed bar to `subscribe_bars` callers.
#[derive(Debug, Clone)]
pub struct BarUpdate {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bar: Bar,
}

/// Broker connectivity / account / order adapter (spec.md §6).
///
/// `subscribe_bars` returns a channel receiver rather than taking a
/// callback handler: that's the async-trait-friendly shape for a push feed
/// and leaves backpressure to the caller instead of running arbitrary
/// caller code on the adapter's own I/O task.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Historical OHLC window.
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> anyhow::Result<Vec<Bar>>;

    /// Subscribe to newly closed bars for the given symbol/timeframe set.
    async fn subscribe_bars(
        &self,
        symbols: &[String],
        timeframes: &[Timeframe],
    ) -> anyhow::Result<mpsc::Receiver<BarUpdate>>;

    async fn account_snapshot(&self) -> anyhow::Result<AccountSnapshot>;

    async fn submit_order(&self, req: OrderRequest) -> anyhow::Result<OrderResult>;

    async fn positions(&self) -> anyhow::Result<Vec<OpenPosition>>;

    async fn cancel_order(&self, client_order_id: &str) -> anyhow::Result<()>;

    fn is_paper(&self) -> bool;

    fn broker_name(&self) -> &str;
}

/// Component wiring only ever holds adapters behind a shared trait object.
pub type SharedBroker = Arc<dyn BrokerAdapter>;

/// In-memory broker backing engine and execution-router tests.
pub mod mock {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    pub struct MockBroker {
        pub name: String,
        pub bars: Vec<Bar>,
        pub account: AccountSnapshot,
        pub positions: Mutex<Vec<OpenPosition>>,
        pub reject_next: AtomicBool,
        next_ticket: AtomicU64,
    }

    impl MockBroker {
        pub fn new(account: AccountSnapshot) -> Self {
            Self {
                name: "mock".to_string(),
                bars: Vec::new(),
                account,
                positions: Mutex::new(Vec::new()),
                reject_next: AtomicBool::new(false),
                next_ticket: AtomicU64::new(1),
            }
        }

        pub fn with_bars(mut self, bars: Vec<Bar>) -> Self {
            self.bars = bars;
            self
        }
    }

    #[async_trait]
    impl BrokerAdapter for MockBroker {
        async fn fetch_bars(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            count: usize,
        ) -> anyhow::Result<Vec<Bar>> {
            let start = self.bars.len().saturating_sub(count);
            Ok(self.bars[start..].to_vec())
        }

        async fn subscribe_bars(
            &self,
            _symbols: &[String],
            _timeframes: &[Timeframe],
        ) -> anyhow::Result<mpsc::Receiver<BarUpdate>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn account_snapshot(&self) -> anyhow::Result<AccountSnapshot> {
            Ok(self.account.clone())
        }

        async fn submit_order(&self, req: OrderRequest) -> anyhow::Result<OrderResult> {
            let client_order_id = req.client_order_id.clone();
            if self.reject_next.swap(false, Ordering::SeqCst) {
                return Ok(OrderResult {
                    client_order_id,
                    broker_order_id: None,
                    status: OrderStatus::Rejected,
                    filled_price: None,
                    filled_volume: None,
                    reason: Some("mock rejection".to_string()),
                });
            }
            let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
            let fill_price = req.limit_price.unwrap_or(1.0);
            self.positions.lock().unwrap().push(OpenPosition {
                ticket: ticket.to_string(),
                symbol: req.symbol.clone(),
                volume: req.volume,
                direction: match req.side {
                    OrderSide::Buy => ict_core::Direction::Bullish,
                    OrderSide::Sell => ict_core::Direction::Bearish,
                },
                entry_price: fill_price,
                stop_loss: req.stop_loss,
                take_profit: req.take_profit,
                opened_at: Utc::now(),
            });
            Ok(OrderResult {
                client_order_id,
                broker_order_id: Some(ticket.to_string()),
                status: OrderStatus::Filled,
                filled_price: Some(fill_price),
                filled_volume: Some(req.volume),
                reason: None,
            })
        }

        async fn positions(&self) -> anyhow::Result<Vec<OpenPosition>> {
            Ok(self.positions.lock().unwrap().clone())
        }

        async fn cancel_order(&self, _client_order_id: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn is_paper(&self) -> bool {
            true
        }

        fn broker_name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockBroker;
    use super::*;

    fn account() -> AccountSnapshot {
        AccountSnapshot {
            balance: 10_000.0,
            equity: 10_000.0,
            margin: 0.0,
            profit: 0.0,
        }
    }

    #[tokio::test]
    async fn submit_order_opens_a_position() {
        let broker = MockBroker::new(account());
        let result = broker
            .submit_order(OrderRequest::market("co-1", "EURUSD", OrderSide::Buy, 0.2))
            .await
            .unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(broker.positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejection_flag_produces_a_rejected_result() {
        let broker = MockBroker::new(account());
        broker
            .reject_next
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let result = broker
            .submit_order(OrderRequest::market("co-2", "EURUSD", OrderSide::Sell, 0.1))
            .await
            .unwrap();
        assert_eq!(result.status, OrderStatus::Rejected);
        assert!(broker.positions().await.unwrap().is_empty());
    }
}
