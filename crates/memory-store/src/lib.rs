pub mod config;
pub mod store;
pub mod unified;

pub use config::{MemoryConfig, PatternKindKey};
pub use store::{HistoricalMemoryStore, HistoricalRecord, Outcome, SystemState};
pub use unified::{MemoryEnhancement, UnifiedMemorySystem};
