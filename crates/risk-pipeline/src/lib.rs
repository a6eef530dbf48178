pub mod config;
pub mod correlation;
pub mod pipeline;
pub mod sizing;

pub use config::RiskPolicy;
pub use correlation::{CorrelationProvider, StaticCorrelationMatrix};
pub use pipeline::{EquitySample, RiskContext, RiskDecision, TradeSignal};
pub use sizing::{calculate_position_size, PositionSizeResult};
