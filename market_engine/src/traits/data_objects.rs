use serde::{Deserialize, Serialize};

/// Which side of an order is archiving it. Archiving hides the order from that side's listing
/// without touching its lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveSide {
    User,
    Agent,
}

/// Completed/cancelled totals for one agent, spanning both single and bundle orders.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentCounts {
    pub completed: i64,
    pub cancelled: i64,
}

impl AgentCounts {
    pub fn total(&self) -> i64 {
        self.completed + self.cancelled
    }
}

/// The result of one outbox dispatch run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OutboxRunReport {
    pub sent: usize,
    pub failed: usize,
}

impl OutboxRunReport {
    pub fn total(&self) -> usize {
        self.sent + self.failed
    }
}
