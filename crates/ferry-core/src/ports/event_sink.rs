//! EventSink port - ドメインイベントの送り先
//!
//! # 実装
//! - NoopEventSink: 何もしない（デフォルト）
//! - MemoryEventSink: 記録するだけ（`impls::inmem_events`）
//!
//! 送信失敗は sink 自身がログに残す。executor の結果には影響させない。

use async_trait::async_trait;

use crate::domain::DomainEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DomainEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: DomainEvent) {}
}
