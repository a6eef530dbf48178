use std::collections::HashMap;

/// Pluggable correlation source (§9 open question: "the exact
/// correlation-matrix source is unclear — runtime estimator vs. static
/// config. Treat it as a pluggable trait with a default static matrix until
/// clarified").
pub trait CorrelationProvider: Send + Sync {
    fn correlation(&self, symbol_a: &str, symbol_b: &str) -> f64;
}

/// Default static correlation matrix over FX majors and common crosses,
/// derived from `original_source/01-CORE/risk_management/risk_pipeline.py`'s
/// static table. Unlisted pairs default to 0.0 (treated as uncorrelated).
pub struct StaticCorrelationMatrix {
    table: HashMap<(String, String), f64>,
}

impl Default for StaticCorrelationMatrix {
    fn default() -> Self {
        let pairs: &[(&str, &str, f64)] = &[
            ("EURUSD", "GBPUSD", 0.85),
            ("EURUSD", "USDCHF", -0.90),
            ("EURUSD", "USDJPY", -0.30),
            ("EURUSD", "AUDUSD", 0.70),
            ("GBPUSD", "EURGBP", -0.75),
            ("USDJPY", "USDCHF", 0.45),
            ("AUDUSD", "NZDUSD", 0.90),
            ("EURJPY", "GBPJPY", 0.80),
            ("XAUUSD", "XAGUSD", 0.75),
        ];
        let mut table = HashMap::new();
        for (a, b, corr) in pairs {
            table.insert((a.to_string(), b.to_string()), *corr);
            table.insert((b.to_string(), a.to_string()), *corr);
        }
        Self { table }
    }
}

impl CorrelationProvider for StaticCorrelationMatrix {
    fn correlation(&self, symbol_a: &str, symbol_b: &str) -> f64 {
        if symbol_a == symbol_b {
            return 1.0;
        }
        self.table
            .get(&(symbol_a.to_string(), symbol_b.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Highest absolute correlation magnitude between `symbol` and any symbol
/// already held open (§4.6 Stage 2).
pub fn max_correlation(provider: &dyn CorrelationProvider, symbol: &str, open_symbols: &[String]) -> f64 {
    open_symbols
        .iter()
        .filter(|s| s.as_str() != symbol)
        .map(|s| provider.correlation(symbol, s).abs())
        .fold(0.0, f64::max)
}
