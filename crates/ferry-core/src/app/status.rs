//! StatusQuery - 台帳の読み取り口
//!
//! 依頼元（HTTP 層・課金側）はここからタスクの結果を見る。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{StatusRecord, TaskId, TaskResult, TaskStatus};
use crate::ports::{LedgerError, StatusLedger};

/// What callers get to see about a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub result: TaskResult,
    pub updated_at: DateTime<Utc>,
}

impl From<StatusRecord> for StatusView {
    fn from(record: StatusRecord) -> Self {
        Self {
            task_id: record.task_id,
            status: record.status,
            result: record.result,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct StatusQuery {
    ledger: Arc<dyn StatusLedger>,
}

impl StatusQuery {
    pub fn new(ledger: Arc<dyn StatusLedger>) -> Self {
        Self { ledger }
    }

    pub async fn get_status(&self, task_id: &TaskId) -> Result<StatusView, LedgerError> {
        self.ledger.get(task_id).await.map(StatusView::from)
    }

    /// Poll until the task reaches a terminal status or `timeout` elapses.
    ///
    /// On timeout the latest non-terminal view is returned, or `NotFound` if
    /// nothing was ever recorded.
    pub async fn wait_terminal(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<StatusView, LedgerError> {
        const POLL: Duration = Duration::from_millis(10);

        // None なら実質無期限
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            let latest = match self.get_status(task_id).await {
                Ok(view) if view.status.is_terminal() => return Ok(view),
                Ok(view) => Ok(view),
                Err(LedgerError::NotFound(id)) => Err(LedgerError::NotFound(id)),
                Err(err) => return Err(err),
            };
            if let Some(deadline) = deadline
                && tokio::time::Instant::now() >= deadline
            {
                return latest;
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryStatusLedger;
    use crate::ports::FixedClock;
    use crate::testing::{UnavailableLedger, t0};

    #[tokio::test]
    async fn view_mirrors_ledger_record() {
        let ledger = Arc::new(InMemoryStatusLedger::new(Arc::new(FixedClock::new(t0()))));
        let query = StatusQuery::new(ledger.clone());
        let id = TaskId::new("t-1");

        ledger
            .update(&id, TaskStatus::Failed, TaskResult::from_error("smtp timeout"))
            .await
            .unwrap();

        let view = query.get_status(&id).await.unwrap();
        assert_eq!(view.status, TaskStatus::Failed);
        assert_eq!(view.result.errors, vec!["smtp timeout".to_string()]);
        assert_eq!(view.updated_at, t0());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["result"]["errors"][0], "smtp timeout");
    }

    #[tokio::test]
    async fn wait_terminal_sees_late_write() {
        let ledger = Arc::new(InMemoryStatusLedger::new(Arc::new(FixedClock::new(t0()))));
        let query = StatusQuery::new(ledger.clone());
        let id = TaskId::new("t-2");

        ledger
            .update(&id, TaskStatus::Pending, TaskResult::empty())
            .await
            .unwrap();
        let writer = {
            let ledger = ledger.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                ledger
                    .update(&id, TaskStatus::Success, TaskResult::empty())
                    .await
            })
        };

        let view = query.wait_terminal(&id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(view.status, TaskStatus::Success);
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_terminal_times_out_with_latest_view() {
        let ledger = Arc::new(InMemoryStatusLedger::new(Arc::new(FixedClock::new(t0()))));
        let query = StatusQuery::new(ledger.clone());

        let missing = query
            .wait_terminal(&TaskId::new("nope"), Duration::from_millis(30))
            .await;
        assert!(matches!(missing, Err(LedgerError::NotFound(_))));

        let id = TaskId::new("t-3");
        ledger
            .update(&id, TaskStatus::Pending, TaskResult::empty())
            .await
            .unwrap();
        let view = query.wait_terminal(&id, Duration::from_millis(30)).await.unwrap();
        assert_eq!(view.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn unbounded_wait_returns_terminal_view() {
        let ledger = Arc::new(InMemoryStatusLedger::new(Arc::new(FixedClock::new(t0()))));
        let query = StatusQuery::new(ledger.clone());
        let id = TaskId::new("t-5");
        ledger
            .update(&id, TaskStatus::Success, TaskResult::empty())
            .await
            .unwrap();

        let view = query.wait_terminal(&id, Duration::MAX).await.unwrap();
        assert_eq!(view.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn storage_failure_is_surfaced() {
        let query = StatusQuery::new(Arc::new(UnavailableLedger));
        let err = query.get_status(&TaskId::new("t-4")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}
