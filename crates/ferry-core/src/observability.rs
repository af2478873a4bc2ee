//! Observability - キューの状態別件数

use serde::{Deserialize, Serialize};

/// Deliveries per state, as reported by the in-memory transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub in_flight: usize,
    pub acked: usize,
    pub retry_scheduled: usize,
    pub dead: usize,
}

impl QueueCounts {
    /// Deliveries that may still be handed to a worker.
    pub fn outstanding(&self) -> usize {
        self.queued + self.in_flight + self.retry_scheduled
    }
}
