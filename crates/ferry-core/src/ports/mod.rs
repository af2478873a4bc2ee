//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。外部システム（ブローカー、台帳ストレージ、
//! 課金サブシステム）との境界を trait で定義し、実装の詳細を隠す。

pub mod clock;
pub mod delivery_queue;
pub mod event_sink;
pub mod id_generator;
pub mod status_ledger;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::delivery_queue::{Delivery, DeliveryHandle, DeliveryId, DeliveryQueue, QueueError};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::status_ledger::{LedgerError, StatusLedger};
