//! Impls - ports の実装（開発・テスト用）
//!
//! - **InMemoryDeliveryQueue**: at-least-once 配送 + バックオフ再配送
//! - **InMemoryStatusLedger**: HashMap ベースの台帳
//! - **MemoryEventSink**: イベントを記録するだけ

pub mod inmem_delivery;
pub mod inmem_events;
pub mod inmem_ledger;
pub mod retry;

pub use self::inmem_delivery::{DeliveryState, InMemoryDeliveryQueue};
pub use self::inmem_events::MemoryEventSink;
pub use self::inmem_ledger::InMemoryStatusLedger;
pub use self::retry::RetryPolicy;
