use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV observation. Immutable once ingested.
///
/// Bars belong to a (symbol, timeframe) stream; streams are monotonically
/// ordered by timestamp with no gaps inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

/// Timeframe granularity, H4 > M15 > M5 by convention for MTF validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Dispatch multiplier used to estimate analysis task duration (§4.4).
    pub fn estimate_time_multiplier(&self) -> f64 {
        match self {
            Timeframe::M5 => 1.0,
            Timeframe::M15 => 1.2,
            Timeframe::H1 => 2.0,
            Timeframe::H4 => 2.5,
            Timeframe::D1 => 3.0,
            Timeframe::M1 => 0.8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternStatus {
    Active,
    Partial,
    Mitigated,
    Expired,
    Invalidated,
}

/// A price zone, always `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceZone {
    pub low: f64,
    pub high: f64,
}

impl PriceZone {
    pub fn new(low: f64, high: f64) -> Self {
        debug_assert!(low < high, "price zone must satisfy low < high");
        Self { low, high }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Significance tier attached to a Point of Interest (§3 POI, SPEC_FULL §14.3).
/// Variant order is significant: `Ord` ranks `Institutional` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Significance {
    Low,
    Medium,
    High,
    Critical,
    Institutional,
}

/// Materialized, significance-tagged view of a pattern or structural level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub pattern_id: u64,
    pub significance: Significance,
    pub expiry_time: DateTime<Utc>,
    pub test_count: u32,
    pub reaction_strength: f64,
}

/// Account snapshot as returned by the broker adapter (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub profit: f64,
}

/// Pip size for a symbol: 0.01 for JPY-quoted pairs, 0.0001 otherwise (§4.7).
pub fn pip_size(symbol: &str) -> f64 {
    if symbol.ends_with("JPY") {
        0.01
    } else {
        0.0001
    }
}

/// A currently open position, exclusively owned by the Execution Router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticket: String,
    pub symbol: String,
    pub volume: f64,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: DateTime<Utc>,
}
