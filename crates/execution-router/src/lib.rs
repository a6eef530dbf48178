pub mod journal;
pub mod router;
pub mod state;

pub use journal::{TradeJournal, TradeJournalEntry};
pub use router::{ExecutionConfig, ExecutionRouter, PendingOrder, RouteOutcome};
pub use state::OrderState;
