pub mod orchestrator;
pub mod significance;

pub use orchestrator::{ConsolidatedView, OrchestratorConfig, PatternOrchestrator, PatternSummaryEntry, SetupSummary};
pub use significance::significance_for;
