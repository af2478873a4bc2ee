//! TaskExecutor - 配送 1 件の実行
//!
//! # フロー
//! 1. kind から handler を引き、ペイロードを decode（失敗しても台帳は触らない）
//! 2. 鮮度判定: 古すぎれば handler を呼ばず、台帳も書かずに破棄
//! 3. handler を別 tokio タスクで実行（panic・タイムアウトを隔離）
//! 4. 結果を台帳に上書き、イベント送信
//!
//! 台帳への書き込みは配送 1 回につき高々 1 回。書き込み失敗はログに残すだけで、
//! handler の再実行はしない。

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::domain::{
    DomainEvent, ExecutionError, HandlerFault, TaskEnvelope, TaskMeta, TaskResult, TaskStatus,
};
use crate::ports::{Clock, EventSink, NoopEventSink, StatusLedger};
use crate::typed::{HandlerRegistry, PreparedTask, TaskContext};

/// What happened to a delivery that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The handler ran and succeeded.
    Completed,

    /// Too old to run; dropped without calling the handler.
    Discarded { age_secs: i64 },
}

pub struct TaskExecutor {
    registry: Arc<HandlerRegistry>,
    ledger: Arc<dyn StatusLedger>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    stale_window: Option<Duration>,
    handler_timeout: Option<Duration>,
}

impl TaskExecutor {
    /// 15 minute staleness window, no handler timeout, no events.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        ledger: Arc<dyn StatusLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            ledger,
            clock,
            events: Arc::new(NoopEventSink),
            stale_window: Some(Duration::from_secs(15 * 60)),
            handler_timeout: None,
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// None disables the staleness check.
    pub fn with_stale_window(mut self, window: Option<Duration>) -> Self {
        self.stale_window = window;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub async fn execute(&self, envelope: &TaskEnvelope) -> Result<Disposition, ExecutionError> {
        let kind = envelope.kind();

        let handler = self.registry.resolve(kind).map_err(|_| {
            tracing::error!(kind = %kind, attempt = envelope.attempt(), "no handler registered for task kind");
            ExecutionError::UnknownTaskKind(kind.clone())
        })?;

        let prepared = handler.prepare(envelope.payload()).map_err(|source| {
            tracing::error!(kind = %kind, error = %source, "malformed task payload");
            ExecutionError::Decode {
                kind: kind.clone(),
                source,
            }
        })?;

        let meta = prepared.meta().clone();
        let span = tracing::info_span!(
            "task",
            task_id = %meta.id,
            kind = %meta.kind,
            title = %meta.title,
            user_id = meta.owner_user_id,
            quota_id = meta.quota_id,
            attempt = envelope.attempt(),
        );

        self.run_prepared(prepared, meta, envelope.attempt())
            .instrument(span)
            .await
    }

    async fn run_prepared(
        &self,
        prepared: Box<dyn PreparedTask>,
        meta: TaskMeta,
        attempt: u32,
    ) -> Result<Disposition, ExecutionError> {
        let now = self.clock.now();
        if meta.is_stale(now, self.stale_window) {
            let age_secs = meta.age(now).num_seconds();
            tracing::info!(age_secs, "task expired before execution; discarding");
            self.events
                .emit(DomainEvent::TaskDiscarded {
                    meta: meta.clone(),
                    age_secs,
                })
                .await;
            return Ok(Disposition::Discarded { age_secs });
        }

        let mut ctx = TaskContext::new(meta.id.clone(), meta.kind.clone(), attempt);
        // Instant に収まらない上限は「期限なし」と同じ扱い
        if let Some(limit) = self.handler_timeout
            && let Some(deadline) = tokio::time::Instant::now().checked_add(limit)
        {
            ctx = ctx.with_deadline(deadline);
        }

        match self.invoke(prepared, ctx).await {
            Ok(()) => {
                tracing::info!("task succeeded");
                self.record(&meta, TaskStatus::Success, TaskResult::empty())
                    .await;
                self.events.emit(DomainEvent::TaskSucceeded { meta }).await;
                Ok(Disposition::Completed)
            }
            Err(fault) => {
                let message = fault.to_string();
                match &fault {
                    HandlerFault::Panicked(_) => {
                        tracing::error!(error = %message, "task handler panicked")
                    }
                    _ => tracing::error!(error = %message, "task failed"),
                }
                self.record(
                    &meta,
                    TaskStatus::Failed,
                    TaskResult::from_error(message.clone()),
                )
                .await;
                let task_id = meta.id.clone();
                self.events
                    .emit(DomainEvent::TaskFailed {
                        meta,
                        errors: vec![message],
                    })
                    .await;
                Err(ExecutionError::Handler { task_id, fault })
            }
        }
    }

    /// Runs the handler on its own tokio task so a panic stops at the join.
    async fn invoke(
        &self,
        prepared: Box<dyn PreparedTask>,
        ctx: TaskContext,
    ) -> Result<(), HandlerFault> {
        let handle = tokio::spawn(prepared.run(ctx));
        let abort = handle.abort_handle();

        let joined = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    abort.abort();
                    return Err(HandlerFault::TimedOut(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result.map_err(HandlerFault::Failed),
            Err(err) if err.is_panic() => {
                Err(HandlerFault::Panicked(panic_message(err.into_panic())))
            }
            Err(_) => Err(HandlerFault::Aborted),
        }
    }

    async fn record(&self, meta: &TaskMeta, status: TaskStatus, result: TaskResult) {
        if meta.id.is_empty() {
            tracing::warn!(status = %status, "task has no id; status not recorded");
            return;
        }
        if let Err(err) = self.ledger.update(&meta.id, status, result).await {
            tracing::error!(status = %status, error = %err, "update task status failed");
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
