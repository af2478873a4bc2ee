//! MemoryEventSink - 送られたイベントを順に記録するだけ

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::DomainEvent;
use crate::ports::EventSink;

#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, in order.
    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: DomainEvent) {
        self.events.lock().await.push(event);
    }
}
