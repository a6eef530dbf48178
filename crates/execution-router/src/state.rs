use serde::{Deserialize, Serialize};

/// Per-signal lifecycle state (§4.8). Transitions only forward; a signal
/// that reaches a terminal state never re-enters the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Received,
    Validated,
    Sized,
    Submitted,
    Filled,
    Rejected,
    TimedOut,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Rejected | OrderState::TimedOut)
    }
}
