//! InMemoryStatusLedger - 開発・テスト用の台帳
//!
//! `updated_at` は注入された Clock から取る。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{StatusRecord, TaskId, TaskResult, TaskStatus};
use crate::ports::{Clock, LedgerError, StatusLedger};

pub struct InMemoryStatusLedger {
    records: RwLock<HashMap<TaskId, StatusRecord>>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
}

impl InMemoryStatusLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
            writes: AtomicU64::new(0),
        }
    }

    /// Total number of `update` calls accepted so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatusLedger for InMemoryStatusLedger {
    async fn update(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result: TaskResult,
    ) -> Result<(), LedgerError> {
        let record = StatusRecord {
            task_id: task_id.clone(),
            status,
            result,
            updated_at: self.clock.now(),
        };
        self.records.write().await.insert(task_id.clone(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<StatusRecord, LedgerError> {
        self.records
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(task_id.clone()))
    }
}
