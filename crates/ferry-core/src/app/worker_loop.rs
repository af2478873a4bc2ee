//! WorkerGroup - 配送キューと executor をつなぐワーカー群
//!
//! # フロー
//! 1. DeliveryQueue::receive() で配送を 1 件受け取る
//! 2. TaskExecutor::execute() を別 tokio タスクで実行（panic したら nack して次へ）
//! 3. 成功・破棄・恒久エラーは ack、一時エラーは nack（再配送の判断はキュー側）

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::executor::{TaskExecutor, panic_message};
use crate::ports::DeliveryQueue;

/// Worker group handle.
/// - `request_shutdown()` で新しい配送の受け取りを止める
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, queue: Arc<dyn DeliveryQueue>, executor: Arc<TaskExecutor>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let ex = Arc::clone(&executor);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, ex, &mut rx).await;
            });
            joins.push(join);
        }

        tracing::info!(workers = n, "worker group started");
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// In-flight handlers are not cancelled; workers just stop taking new deliveries.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker terminated abnormally");
            }
        }
        tracing::info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn DeliveryQueue>,
    executor: Arc<TaskExecutor>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // receive は待つので shutdown と競合させる
        let delivery = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // sender ごと消えた
                    break;
                }
                continue;
            }
            delivery = queue.receive() => delivery,
        };

        let Some(delivery) = delivery else {
            tracing::debug!(worker = worker_id, "delivery queue closed");
            break;
        };

        let envelope = delivery.envelope().clone();

        // handler の外（decode 後の meta 取得など）で panic してもワーカーは落とさない
        let joined = {
            let executor = Arc::clone(&executor);
            let envelope = envelope.clone();
            tokio::spawn(async move { executor.execute(&envelope).await }).await
        };

        let settled = match joined {
            Ok(Ok(_)) => delivery.ack().await,
            Ok(Err(err)) if err.kind().is_retryable() => delivery.nack(err.to_string()).await,
            Ok(Err(err)) => {
                tracing::warn!(
                    worker = worker_id,
                    kind = %envelope.kind(),
                    error = %err,
                    "dropping undeliverable task"
                );
                delivery.ack().await
            }
            Err(err) => {
                let message = if err.is_panic() {
                    format!("executor panicked: {}", panic_message(err.into_panic()))
                } else {
                    format!("executor aborted: {err}")
                };
                tracing::error!(
                    worker = worker_id,
                    kind = %envelope.kind(),
                    error = %message,
                    "task execution crashed"
                );
                delivery.nack(message).await
            }
        };

        if let Err(err) = settled {
            tracing::error!(
                worker = worker_id,
                kind = %envelope.kind(),
                error = %err,
                "settle delivery failed"
            );
        }
    }
}
