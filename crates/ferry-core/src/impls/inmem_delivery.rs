//! InMemoryDeliveryQueue - 開発・テスト用の配送キュー
//!
//! # 学習ポイント
//! - tokio::sync::Mutex + Notify による async な待ち受け
//! - BinaryHeap を min-heap として使うバックオフ予約
//!
//! # 状態遷移
//! ```text
//! Queued → InFlight → Acked
//!                   ↘ RetryScheduled → Queued (バックオフ後)
//!                   ↘ Dead (max_attempts 到達)
//! ```
//!
//! 配送は at-least-once。nack された配送は同じ envelope で再配送される。
//!
//! 終了した配送（Acked / Dead）は直近 `retained_settled` 件だけ記録を残し、
//! それより古いものは件数だけ数えて捨てる。

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::RetryPolicy;
use crate::domain::TaskEnvelope;
use crate::observability::QueueCounts;
use crate::ports::{Delivery, DeliveryHandle, DeliveryId, DeliveryQueue, QueueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Queued,
    InFlight,
    Acked,
    RetryScheduled,
    Dead,
}

#[derive(Debug, Clone)]
struct DeliveryRecord {
    envelope: TaskEnvelope,
    state: DeliveryState,
    attempts: u32,
    last_error: Option<String>,
}

/// Scheduled redelivery entry.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledDelivery {
    next_run_at: Instant,
    id: DeliveryId,
}

impl PartialOrd for ScheduledDelivery {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledDelivery {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Settled records kept for inspection by default.
const DEFAULT_RETAINED_SETTLED: usize = 1024;

struct QueueState {
    records: HashMap<DeliveryId, DeliveryRecord>,
    ready: VecDeque<DeliveryId>,
    scheduled: BinaryHeap<ScheduledDelivery>,
    /// Acked / Dead の id、古い順
    settled: VecDeque<DeliveryId>,
    acked_total: usize,
    dead_total: usize,
    next_id: u64,
    closed: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            settled: VecDeque::new(),
            acked_total: 0,
            dead_total: 0,
            next_id: 1,
            closed: false,
        }
    }

    fn allocate_id(&mut self) -> DeliveryId {
        let id = DeliveryId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Move redeliveries whose backoff has elapsed back to the ready queue.
    ///
    /// Once closed, every scheduled redelivery is due immediately.
    fn promote_scheduled(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if !self.closed && entry.next_run_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.id)
                && record.state == DeliveryState::RetryScheduled
            {
                record.state = DeliveryState::Queued;
                self.ready.push_back(entry.id);
            }
        }
    }

    /// Mark a delivery finished and evict the oldest settled records past `retain`.
    fn settle(&mut self, id: DeliveryId, final_state: DeliveryState, retain: usize) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        record.state = final_state;
        match final_state {
            DeliveryState::Acked => self.acked_total += 1,
            DeliveryState::Dead => self.dead_total += 1,
            _ => {}
        }

        self.settled.push_back(id);
        while self.settled.len() > retain {
            if let Some(oldest) = self.settled.pop_front() {
                self.records.remove(&oldest);
            }
        }
    }

    fn has_in_flight(&self) -> bool {
        self.records
            .values()
            .any(|r| r.state == DeliveryState::InFlight)
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            acked: self.acked_total,
            dead: self.dead_total,
            ..QueueCounts::default()
        };
        for record in self.records.values() {
            match record.state {
                DeliveryState::Queued => counts.queued += 1,
                DeliveryState::InFlight => counts.in_flight += 1,
                DeliveryState::RetryScheduled => counts.retry_scheduled += 1,
                DeliveryState::Acked | DeliveryState::Dead => {}
            }
        }
        counts
    }
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    retry_policy: RetryPolicy,
    max_attempts: u32,
    retained_settled: usize,
}

/// At-least-once in-memory transport.
///
/// Cheap to share behind `Arc`; every delivery keeps a handle back to the queue.
pub struct InMemoryDeliveryQueue {
    shared: Arc<Shared>,
}

impl InMemoryDeliveryQueue {
    /// `max_attempts` is clamped to at least 1.
    pub fn new(retry_policy: RetryPolicy, max_attempts: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new()),
                notify: Notify::new(),
                retry_policy,
                max_attempts: max_attempts.max(1),
                retained_settled: DEFAULT_RETAINED_SETTLED,
            }),
        }
    }

    /// How many Acked / Dead records `state_of` can still see.
    ///
    /// Call before the queue is shared; later calls have no effect.
    pub fn with_retained_settled(mut self, n: usize) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.retained_settled = n;
        }
        self
    }

    /// Stop accepting submissions and drain.
    ///
    /// Ready and backoff-scheduled deliveries are handed out without waiting
    /// for their backoff. `receive` returns `None` only once nothing is ready,
    /// scheduled or in flight, so a delivery nacked during the drain is still
    /// redelivered. A delivery dropped without ack/nack stays in flight and
    /// keeps receivers waiting.
    pub async fn close(&self) {
        self.shared.state.lock().await.closed = true;
        self.shared.notify.notify_waiters();
    }

    pub async fn counts(&self) -> QueueCounts {
        self.shared.state.lock().await.counts()
    }

    pub async fn state_of(&self, id: DeliveryId) -> Option<DeliveryState> {
        let state = self.shared.state.lock().await;
        state.records.get(&id).map(|r| r.state)
    }

    /// Reason given with the latest nack, if any.
    pub async fn last_error(&self, id: DeliveryId) -> Option<String> {
        let state = self.shared.state.lock().await;
        state.records.get(&id).and_then(|r| r.last_error.clone())
    }
}

impl Default for InMemoryDeliveryQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), 5)
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn submit(&self, envelope: TaskEnvelope) -> Result<DeliveryHandle, QueueError> {
        let id = {
            let mut state = self.shared.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }
            let id = state.allocate_id();
            state.records.insert(
                id,
                DeliveryRecord {
                    envelope,
                    state: DeliveryState::Queued,
                    attempts: 0,
                    last_error: None,
                },
            );
            state.ready.push_back(id);
            id
        };

        self.shared.notify.notify_one();
        Ok(DeliveryHandle { id })
    }

    async fn receive(&self) -> Option<Box<dyn Delivery>> {
        loop {
            // close() は notify_waiters なので、状態を見る前に登録しておく
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = self.shared.state.lock().await;
                state.promote_scheduled(Instant::now());

                while let Some(id) = state.ready.pop_front() {
                    let Some(record) = state.records.get_mut(&id) else {
                        continue;
                    };
                    record.attempts += 1;
                    record.state = DeliveryState::InFlight;
                    let envelope = record.envelope.clone().with_attempt(record.attempts);
                    return Some(Box::new(InMemoryDelivery {
                        id,
                        envelope,
                        shared: Arc::clone(&self.shared),
                    }));
                }

                if state.closed && state.scheduled.is_empty() && !state.has_in_flight() {
                    return None;
                }

                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            // 通知 or 次の予約時刻まで待つ
            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = &mut notified => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => notified.await,
            }
        }
    }
}

/// Delivery handed out by InMemoryDeliveryQueue.
struct InMemoryDelivery {
    id: DeliveryId,
    envelope: TaskEnvelope,
    shared: Arc<Shared>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn envelope(&self) -> &TaskEnvelope {
        &self.envelope
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let closed = {
            let mut state = self.shared.state.lock().await;
            if !state.records.contains_key(&self.id) {
                return Err(QueueError::UnknownDelivery(self.id));
            }
            state.settle(self.id, DeliveryState::Acked, self.shared.retained_settled);
            state.closed
        };

        // drain 中の receiver は in-flight が無くなるのを待っている
        if closed {
            self.shared.notify.notify_waiters();
        }
        Ok(())
    }

    async fn nack(self: Box<Self>, reason: String) -> Result<(), QueueError> {
        let (should_notify, closed) = {
            let mut guard = self.shared.state.lock().await;
            let state = &mut *guard;
            let record = state
                .records
                .get_mut(&self.id)
                .ok_or(QueueError::UnknownDelivery(self.id))?;
            record.last_error = Some(reason);

            let should_notify = if record.attempts >= self.shared.max_attempts {
                tracing::warn!(
                    delivery = %self.id,
                    kind = %record.envelope.kind(),
                    attempts = record.attempts,
                    "delivery exhausted its attempts; marking dead"
                );
                state.settle(self.id, DeliveryState::Dead, self.shared.retained_settled);
                false
            } else {
                let delay = self.shared.retry_policy.next_delay(record.attempts);
                let next_run_at = Instant::now()
                    .checked_add(delay)
                    .unwrap_or_else(|| Instant::now() + std::time::Duration::from_secs(86_400));
                record.state = DeliveryState::RetryScheduled;
                tracing::debug!(
                    delivery = %self.id,
                    attempts = record.attempts,
                    delay_ms = delay.as_millis() as u64,
                    "redelivery scheduled"
                );
                state.scheduled.push(ScheduledDelivery {
                    next_run_at,
                    id: self.id,
                });
                true
            };
            (should_notify, state.closed)
        };

        // ロックを離してから通知する
        if closed {
            self.shared.notify.notify_waiters();
        } else if should_notify {
            self.shared.notify.notify_one();
        }
        Ok(())
    }
}
