//! StatusLedger port - タスク結果の正本
//!
//! 1 タスク ID = 1 行。書き込みは毎回全体の上書きなので、read-modify-write の
//! 競合を気にする必要はない。保存先ごとの行単位の原子性だけを前提にする。
//!
//! # 実装
//! - InMemoryStatusLedger（開発・テスト用、`impls::inmem_ledger`）

use async_trait::async_trait;

use crate::domain::{StatusRecord, TaskId, TaskResult, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("no status recorded for task_id={0}")]
    NotFound(TaskId),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StatusLedger: Send + Sync {
    /// Overwrite the record for `task_id`. Idempotent.
    async fn update(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result: TaskResult,
    ) -> Result<(), LedgerError>;

    async fn get(&self, task_id: &TaskId) -> Result<StatusRecord, LedgerError>;
}
