use std::path::{Path, PathBuf};

use broker_trait::OrderSide;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::OrderState;

/// One append-only record of a signal's terminal (or Submitted) state.
/// Written as JSONL, never rewritten (§4.8).
#[derive(Debug, Clone, Serialize)]
pub struct TradeJournalEntry {
    pub timestamp: DateTime<Utc>,
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub lots: f64,
    pub state: OrderState,
    pub reason: Option<String>,
}

pub struct TradeJournal {
    path: PathBuf,
}

impl TradeJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, entry: &TradeJournalEntry) -> std::io::Result<()> {
        ict_core::snapshot::append_jsonl(&self.path, entry)
    }
}
