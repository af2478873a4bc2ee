//! Handler trait - Task を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler / PreparedTask)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)
//!
//! # 二段階の実行
//! 1. `DynHandler::prepare` で bytes を decode し、契約フィールドを `TaskMeta` に写す
//! 2. executor が鮮度判定をしてから `PreparedTask::run` を呼ぶ
//!
//! `run` は `Box<Self>` を消費し `'static` な future を返すので、
//! executor はそれを別 tokio タスクに載せて panic を隔離できる。

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Instant;

use super::codec::{CodecError, PayloadCodec};
use super::task::Task;
use crate::domain::{HandlerError, StalePolicy, TaskId, TaskKind, TaskMeta};

/// Per-invocation information handed to a handler.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    kind: TaskKind,
    attempt: u32,
    deadline: Option<Instant>,
}

impl TaskContext {
    pub fn new(task_id: TaskId, kind: TaskKind, attempt: u32) -> Self {
        Self {
            task_id,
            kind,
            attempt,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    /// Delivery attempt as stamped by the transport (1-based, 0 if unknown).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Deadline after which the engine stops waiting for this invocation.
    /// Handlers can use it to bound their own I/O.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Handler は Task を実行する
///
/// # 使用例
/// ```ignore
/// struct ResizeHandler;
///
/// #[async_trait]
/// impl Handler<ResizeImage> for ResizeHandler {
///     async fn handle(&self, ctx: &TaskContext, task: ResizeImage) -> Result<(), HandlerError> {
///         resize(&task.url).await.map_err(HandlerError::from_source)
///     }
/// }
/// ```
///
/// Handlers may run more than once for the same task id (the transport delivers at
/// least once), so their side effects must tolerate repetition.
#[async_trait]
pub trait Handler<T: Task>: Send + Sync + 'static {
    async fn handle(&self, ctx: &TaskContext, task: T) -> Result<(), HandlerError>;
}

/// Handler over the raw encoded payload, for kinds without a typed payload.
///
/// The payload must still carry the common contract fields (see [`TaskHeader`]).
#[async_trait]
pub trait RawHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: &TaskContext, payload: &[u8]) -> Result<(), HandlerError>;
}

/// A decoded task bound to its handler, ready to run.
#[async_trait]
pub trait PreparedTask: Send {
    fn meta(&self) -> &TaskMeta;

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// HashMap<TaskKind, Arc<dyn DynHandler>> に格納するための型消去レイヤー。
pub trait DynHandler: Send + Sync {
    fn kind(&self) -> &str;

    fn prepare(&self, payload: &[u8]) -> Result<Box<dyn PreparedTask>, CodecError>;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: Arc<H>,
    _marker: PhantomData<T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            _marker: PhantomData,
        }
    }
}

impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn kind(&self) -> &str {
        T::KIND
    }

    fn prepare(&self, payload: &[u8]) -> Result<Box<dyn PreparedTask>, CodecError> {
        let task: T = PayloadCodec::decode(payload)?;
        Ok(Box::new(TypedPreparedTask {
            meta: TaskMeta::of(&task),
            task,
            handler: Arc::clone(&self.handler),
        }))
    }
}

struct TypedPreparedTask<T: Task, H: Handler<T>> {
    meta: TaskMeta,
    task: T,
    handler: Arc<H>,
}

#[async_trait]
impl<T: Task, H: Handler<T>> PreparedTask for TypedPreparedTask<T, H> {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), HandlerError> {
        let TypedPreparedTask { task, handler, .. } = *self;
        handler.handle(&ctx, task).await
    }
}

/// Contract fields every raw payload must expose under these names.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskHeader {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub user_id: i64,

    #[serde(default)]
    pub quota_id: i64,

    #[serde(default)]
    pub quota_amount: i64,

    pub created_at: DateTime<Utc>,
}

pub struct RawDynHandler<H: RawHandler> {
    kind: TaskKind,
    handler: Arc<H>,
}

impl<H: RawHandler> RawDynHandler<H> {
    pub fn new(kind: impl Into<TaskKind>, handler: H) -> Self {
        Self {
            kind: kind.into(),
            handler: Arc::new(handler),
        }
    }
}

impl<H: RawHandler> DynHandler for RawDynHandler<H> {
    fn kind(&self) -> &str {
        self.kind.as_str()
    }

    fn prepare(&self, payload: &[u8]) -> Result<Box<dyn PreparedTask>, CodecError> {
        let header: TaskHeader = PayloadCodec::decode(payload)?;
        let meta = TaskMeta {
            id: TaskId::new(header.id),
            kind: self.kind.clone(),
            title: header.title,
            owner_user_id: header.user_id,
            quota_id: header.quota_id,
            quota_amount: header.quota_amount,
            created_at: header.created_at,
            stale_policy: StalePolicy::EngineDefault,
        };
        Ok(Box::new(RawPreparedTask {
            meta,
            payload: payload.to_vec(),
            handler: Arc::clone(&self.handler),
        }))
    }
}

struct RawPreparedTask<H: RawHandler> {
    meta: TaskMeta,
    payload: Vec<u8>,
    handler: Arc<H>,
}

#[async_trait]
impl<H: RawHandler> PreparedTask for RawPreparedTask<H> {
    fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), HandlerError> {
        let RawPreparedTask {
            payload, handler, ..
        } = *self;
        handler.handle(&ctx, &payload).await
    }
}
