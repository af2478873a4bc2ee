//! ferry-core
//!
//! Task queue execution engine: typed payloads go in through a producer,
//! workers pull them off a delivery queue, run the registered handler and
//! record the outcome in a status ledger.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, kind, envelope, meta, status, errors, events）
//! - **typed**: 型付き Task API（Task trait, Handler trait, HandlerRegistry, PayloadCodec）
//! - **ports**: 抽象化レイヤー（StatusLedger, DeliveryQueue, Clock, IdGenerator, EventSink）
//! - **impls**: 開発・テスト用の実装（InMemoryDeliveryQueue, InMemoryStatusLedger など）
//! - **app**: アプリケーションロジック（builder, executor, producer, worker_loop, status）
//! - **tasks**: 業務タスク（mail:send）
//! - **config**: EngineConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod tasks;
pub mod typed;

#[cfg(test)]
mod testing;

pub use crate::app::{
    App, AppBuilder, BuildError, Disposition, ProduceError, Producer, StatusQuery, StatusView,
    TaskExecutor, WorkerGroup,
};
pub use crate::config::{ConfigError, EngineConfig};
pub use crate::domain::{
    DomainEvent, ErrorKind, ExecutionError, HandlerError, HandlerFault, StalePolicy, TaskEnvelope,
    TaskId, TaskKind, TaskMeta, TaskResult, TaskStatus,
};
pub use crate::typed::{Handler, HandlerRegistry, Task, TaskContext};
