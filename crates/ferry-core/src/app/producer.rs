//! Producer - タスクの投入
//!
//! ID が空なら採番し、kind タグ付きの envelope にして配送キューへ渡す。
//! 台帳が付いていれば `pending` を先に書いてから submit する
//! （後から書くと、先に終わった実行の結果を pending で潰しうる）。
//! submit に失敗した場合は同じ行を `failed` で上書きする。

use std::sync::Arc;

use crate::domain::{TaskEnvelope, TaskId, TaskKind, TaskResult, TaskStatus};
use crate::ports::{DeliveryQueue, IdGenerator, LedgerError, QueueError, StatusLedger};
use crate::typed::{CodecError, PayloadCodec, Task};

#[derive(Debug, thiserror::Error)]
pub enum ProduceError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("record pending status: {0}")]
    Ledger(#[from] LedgerError),

    #[error("submit to delivery queue: {0}")]
    Queue(#[from] QueueError),
}

pub struct Producer {
    ids: Arc<dyn IdGenerator>,
    ledger: Option<Arc<dyn StatusLedger>>,
}

impl Producer {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids, ledger: None }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn StatusLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Assign an id if the payload has none, then encode it.
    ///
    /// A non-empty id is never replaced.
    pub fn build<T: Task>(&self, task: &mut T) -> Result<TaskEnvelope, CodecError> {
        if task.id().is_empty() {
            task.set_id(self.ids.generate_task_id().into_string());
        }
        let payload = PayloadCodec::encode(&*task)?;
        Ok(TaskEnvelope::new(TaskKind::new(T::KIND), payload))
    }

    pub async fn enqueue<T: Task>(
        &self,
        queue: &dyn DeliveryQueue,
        task: &mut T,
    ) -> Result<TaskId, ProduceError> {
        let envelope = self.build(task)?;
        let task_id = TaskId::new(task.id());

        if let Some(ledger) = &self.ledger {
            ledger
                .update(&task_id, TaskStatus::Pending, TaskResult::empty())
                .await?;
        }

        let handle = match queue.submit(envelope).await {
            Ok(handle) => handle,
            Err(err) => {
                let err = ProduceError::Queue(err);
                self.settle_unsubmitted(&task_id, &err).await;
                return Err(err);
            }
        };
        tracing::debug!(
            task_id = %task_id,
            kind = T::KIND,
            title = %task.title(),
            delivery = %handle.id,
            "task enqueued"
        );
        Ok(task_id)
    }

    /// The `pending` row is already written; a task that never reached the queue
    /// must not stay pending.
    async fn settle_unsubmitted(&self, task_id: &TaskId, err: &ProduceError) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let result = TaskResult::from_error(err.to_string());
        if let Err(ledger_err) = ledger.update(task_id, TaskStatus::Failed, result).await {
            tracing::error!(
                task_id = %task_id,
                error = %ledger_err,
                "mark unsubmitted task failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryDeliveryQueue, InMemoryStatusLedger, RetryPolicy};
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::testing::{SampleTask, t0};

    fn producer() -> Producer {
        Producer::new(Arc::new(UlidGenerator::new(FixedClock::new(t0()))))
    }

    #[test]
    fn build_assigns_id_only_when_empty() {
        let producer = producer();

        let mut anonymous = SampleTask::fresh("");
        let envelope = producer.build(&mut anonymous).unwrap();
        assert!(!anonymous.id.is_empty());
        assert_eq!(envelope.kind().as_str(), SampleTask::KIND);

        let decoded: SampleTask = PayloadCodec::decode(envelope.payload()).unwrap();
        assert_eq!(decoded.id, anonymous.id);

        let mut named = SampleTask::fresh("keep-me");
        producer.build(&mut named).unwrap();
        assert_eq!(named.id, "keep-me");
    }

    #[test]
    fn building_twice_keeps_the_first_id() {
        let producer = producer();
        let mut sample = SampleTask::fresh("");

        producer.build(&mut sample).unwrap();
        let first = sample.id.clone();
        producer.build(&mut sample).unwrap();
        assert_eq!(sample.id, first);
    }

    #[tokio::test]
    async fn enqueue_records_pending_then_submits() {
        let clock = FixedClock::new(t0());
        let ledger = Arc::new(InMemoryStatusLedger::new(Arc::new(clock)));
        let queue = InMemoryDeliveryQueue::new(RetryPolicy::immediate(), 3);
        let producer = producer().with_ledger(ledger.clone());

        let mut sample = SampleTask::fresh("");
        let task_id = producer.enqueue(&queue, &mut sample).await.unwrap();

        assert_eq!(task_id.as_str(), sample.id);
        let record = ledger.get(&task_id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(queue.counts().await.queued, 1);
    }

    #[tokio::test]
    async fn closed_queue_is_reported() {
        let queue = InMemoryDeliveryQueue::new(RetryPolicy::immediate(), 3);
        queue.close().await;

        let err = producer()
            .enqueue(&queue, &mut SampleTask::fresh("t-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProduceError::Queue(QueueError::Closed)));
    }

    #[tokio::test]
    async fn failed_submit_does_not_leave_a_pending_row() {
        let clock = FixedClock::new(t0());
        let ledger = Arc::new(InMemoryStatusLedger::new(Arc::new(clock)));
        let queue = InMemoryDeliveryQueue::new(RetryPolicy::immediate(), 3);
        queue.close().await;
        let producer = producer().with_ledger(ledger.clone());

        let mut sample = SampleTask::fresh("t-closed");
        let err = producer.enqueue(&queue, &mut sample).await.unwrap_err();
        assert!(matches!(err, ProduceError::Queue(QueueError::Closed)));

        let record = ledger.get(&TaskId::new("t-closed")).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(
            record.result.errors,
            vec!["submit to delivery queue: queue is closed".to_string()]
        );
    }
}
