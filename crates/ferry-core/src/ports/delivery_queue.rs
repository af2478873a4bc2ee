//! DeliveryQueue port - 外部の配送キュー
//!
//! 配送保証は at-least-once。リトライ・バックオフ・dead の判断はキュー側の責務で、
//! executor 側では回数を数えない。
//!
//! # 実装
//! - InMemoryDeliveryQueue（開発・テスト用、`impls::inmem_delivery`）

use std::fmt;

use async_trait::async_trait;

use crate::domain::TaskEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryId(pub u64);

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delivery-{}", self.0)
    }
}

/// Receipt returned by `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryHandle {
    pub id: DeliveryId,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("unknown delivery: {0}")]
    UnknownDelivery(DeliveryId),

    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

/// One delivered message. The worker owns it and must either `ack` or `nack`.
#[async_trait]
pub trait Delivery: Send {
    fn envelope(&self) -> &TaskEnvelope;

    /// Consumed: do not redeliver.
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    /// Failed: the queue decides between retry and dead.
    async fn nack(self: Box<Self>, reason: String) -> Result<(), QueueError>;
}

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn submit(&self, envelope: TaskEnvelope) -> Result<DeliveryHandle, QueueError>;

    /// Waits for the next delivery. `None` once the queue is closed.
    async fn receive(&self) -> Option<Box<dyn Delivery>>;
}
