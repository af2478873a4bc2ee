//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装する。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **TaskExecutor**: 配送 1 件の実行（鮮度判定・panic 隔離・台帳更新）
//! - **Producer**: ID 採番と投入
//! - **WorkerGroup**: receive → execute → ack/nack のループ
//! - **StatusQuery**: 台帳の読み取り

pub mod builder;
pub mod executor;
pub mod producer;
pub mod status;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::executor::{Disposition, TaskExecutor};
pub use self::producer::{ProduceError, Producer};
pub use self::status::{StatusQuery, StatusView};
pub use self::worker_loop::WorkerGroup;
