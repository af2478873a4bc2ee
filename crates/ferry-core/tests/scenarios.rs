//! End-to-end scenarios: producer → in-memory queue → workers → ledger.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use ferry_core::domain::{DomainEvent, TaskEnvelope, TaskId, TaskKind, TaskStatus};
use ferry_core::impls::{DeliveryState, InMemoryDeliveryQueue, MemoryEventSink};
use ferry_core::ports::{DeliveryQueue, FixedClock, LedgerError};
use ferry_core::tasks::mail::{MAIL_SEND_KIND, MailError, MailSendHandler, MailTask, Mailer};
use ferry_core::{App, AppBuilder, EngineConfig, Task};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Fails for `@timeout.invalid`, panics for `@panic.invalid`, sends otherwise.
#[derive(Clone, Default)]
struct ScriptedMailer {
    sent: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl Mailer for ScriptedMailer {
    async fn send(&self, to: &[String], _subject: &str, _body: &str) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if to.iter().any(|addr| addr.ends_with("@timeout.invalid")) {
            return Err(MailError::new("smtp timeout"));
        }
        if to.iter().any(|addr| addr.ends_with("@panic.invalid")) {
            panic!("mail transport exploded");
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    app: App,
    queue: Arc<InMemoryDeliveryQueue>,
    clock: FixedClock,
    mailer: ScriptedMailer,
    events: Arc<MemoryEventSink>,
}

fn harness(workers: usize, max_delivery_attempts: u32) -> Harness {
    let clock = FixedClock::new(t0());
    let mailer = ScriptedMailer::default();
    let events = Arc::new(MemoryEventSink::new());
    let config = EngineConfig {
        workers,
        max_delivery_attempts,
        retry_base_delay_ms: 0,
        ..EngineConfig::default()
    };
    let app = AppBuilder::new()
        .with_config(config)
        .with_clock(Arc::new(clock.clone()))
        .with_event_sink(events.clone())
        .register::<MailTask, _>(MailSendHandler::new(mailer.clone(), "【optima】"))
        .unwrap()
        .expect_tasks(&[MAIL_SEND_KIND])
        .build()
        .unwrap();
    let queue = Arc::new(app.in_memory_queue());

    Harness {
        app,
        queue,
        clock,
        mailer,
        events,
    }
}

impl Harness {
    async fn settle(&self) {
        for _ in 0..400 {
            if self.queue.counts().await.outstanding() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queue did not settle: {:?}", self.queue.counts().await);
    }

    async fn enqueue(&self, mut mail: MailTask) -> TaskId {
        self.app
            .producer()
            .enqueue(self.queue.as_ref(), &mut mail)
            .await
            .unwrap()
    }
}

fn mail_to(addr: &str, created_at: DateTime<Utc>) -> MailTask {
    MailTask::new(vec![addr.to_string()], "Welcome", "hello", created_at)
}

#[tokio::test]
async fn fresh_mail_is_sent_and_marked_success() {
    let h = harness(2, 3);
    let workers = h.app.spawn_workers(h.queue.clone());

    h.clock.advance(chrono::Duration::minutes(1));
    let id = h.enqueue(mail_to("a@x.io", t0())).await;
    let view = h
        .app
        .status()
        .wait_terminal(&id, Duration::from_secs(2))
        .await
        .unwrap();
    h.settle().await;
    workers.shutdown_and_join().await;

    assert_eq!(view.status, TaskStatus::Success);
    assert!(view.result.is_empty());
    assert_eq!(h.mailer.sent.load(Ordering::SeqCst), 1);
    assert_eq!(h.queue.counts().await.acked, 1);
}

#[tokio::test]
async fn stale_mail_is_discarded_without_touching_the_ledger() {
    let h = harness(1, 3);
    let id = TaskId::new("stale-1");

    // 20 分前に作られたタスク（窓は 15 分）
    h.clock.advance(chrono::Duration::minutes(20));
    let mut mail = mail_to("a@x.io", t0());
    mail.id = id.as_str().to_string();
    let envelope = TaskEnvelope::new(
        TaskKind::new(MAIL_SEND_KIND),
        serde_json::to_vec(&mail).unwrap(),
    );
    let handle = h.queue.submit(envelope).await.unwrap();

    let workers = h.app.spawn_workers(h.queue.clone());
    h.settle().await;
    workers.shutdown_and_join().await;

    assert_eq!(h.mailer.attempts.load(Ordering::SeqCst), 0);
    assert!(matches!(
        h.app.status().get_status(&id).await,
        Err(LedgerError::NotFound(_))
    ));
    assert_eq!(h.queue.state_of(handle.id).await, Some(DeliveryState::Acked));
    assert!(matches!(
        h.events.events().await.as_slice(),
        [DomainEvent::TaskDiscarded { age_secs: 1200, .. }]
    ));
}

#[tokio::test]
async fn smtp_failure_is_recorded_and_redelivered() {
    let h = harness(1, 2);
    let workers = h.app.spawn_workers(h.queue.clone());

    let id = h.enqueue(mail_to("b@timeout.invalid", t0())).await;
    h.settle().await;
    workers.shutdown_and_join().await;

    let view = h.app.status().get_status(&id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Failed);
    assert_eq!(view.result.errors, vec!["smtp timeout".to_string()]);

    // max_delivery_attempts = 2
    assert_eq!(h.mailer.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(h.queue.counts().await.dead, 1);
}

#[tokio::test]
async fn panicking_handler_does_not_take_the_worker_down() {
    let h = harness(1, 1);
    let workers = h.app.spawn_workers(h.queue.clone());

    let bad = h.enqueue(mail_to("c@panic.invalid", t0())).await;
    let good = h.enqueue(mail_to("d@x.io", t0())).await;
    h.settle().await;
    workers.shutdown_and_join().await;

    let bad = h.app.status().get_status(&bad).await.unwrap();
    assert_eq!(bad.status, TaskStatus::Failed);
    assert!(bad.result.errors[0].contains("mail transport exploded"));

    let good = h.app.status().get_status(&good).await.unwrap();
    assert_eq!(good.status, TaskStatus::Success);
}

#[tokio::test]
async fn unknown_kind_is_dropped_without_a_ledger_write() {
    let h = harness(1, 3);
    let envelope = TaskEnvelope::new(
        TaskKind::new("video:render"),
        br#"{"id":"v-1","created_at":"2024-01-01T12:00:00Z"}"#.to_vec(),
    );
    let handle = h.queue.submit(envelope).await.unwrap();

    let workers = h.app.spawn_workers(h.queue.clone());
    h.settle().await;
    workers.shutdown_and_join().await;

    assert_eq!(h.queue.state_of(handle.id).await, Some(DeliveryState::Acked));
    assert!(matches!(
        h.app.status().get_status(&TaskId::new("v-1")).await,
        Err(LedgerError::NotFound(_))
    ));
    assert!(h.events.events().await.is_empty());
}

#[tokio::test]
async fn producer_assigns_ids_and_records_pending_first() {
    let h = harness(1, 3);

    let mut mail = mail_to("a@x.io", t0());
    assert!(mail.id().is_empty());
    let id = h
        .app
        .producer()
        .enqueue(h.queue.as_ref(), &mut mail)
        .await
        .unwrap();

    assert_eq!(mail.id(), id.as_str());
    let view = h.app.status().get_status(&id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Pending);

    let mut named = mail_to("a@x.io", t0());
    named.id = "caller-chosen".to_string();
    let id = h
        .app
        .producer()
        .enqueue(h.queue.as_ref(), &mut named)
        .await
        .unwrap();
    assert_eq!(id.as_str(), "caller-chosen");
}

#[tokio::test]
async fn failed_quota_task_reports_its_reservation() {
    #[derive(serde::Serialize, serde::Deserialize)]
    struct Generate {
        #[serde(default)]
        id: String,
        user_id: i64,
        quota_id: i64,
        quota_amount: i64,
        created_at: DateTime<Utc>,
    }

    impl Task for Generate {
        const KIND: &'static str = "ai:generate";

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }

        fn title(&self) -> String {
            "generate".to_string()
        }

        fn owner_user_id(&self) -> i64 {
            self.user_id
        }

        fn quota_id(&self) -> i64 {
            self.quota_id
        }

        fn quota_amount(&self) -> i64 {
            self.quota_amount
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }
    }

    struct VendorDown;

    #[async_trait]
    impl ferry_core::Handler<Generate> for VendorDown {
        async fn handle(
            &self,
            _ctx: &ferry_core::TaskContext,
            _task: Generate,
        ) -> Result<(), ferry_core::HandlerError> {
            Err(ferry_core::HandlerError::new("vendor unavailable"))
        }
    }

    let events = Arc::new(MemoryEventSink::new());
    let app = AppBuilder::new()
        .with_config(EngineConfig {
            workers: 1,
            max_delivery_attempts: 1,
            ..EngineConfig::default()
        })
        .with_clock(Arc::new(FixedClock::new(t0())))
        .with_event_sink(events.clone())
        .register::<Generate, _>(VendorDown)
        .unwrap()
        .build()
        .unwrap();
    let queue = Arc::new(app.in_memory_queue());
    let workers = app.spawn_workers(queue.clone());

    let mut task = Generate {
        id: String::new(),
        user_id: 42,
        quota_id: 7,
        quota_amount: 120,
        created_at: t0(),
    };
    let id = app.producer().enqueue(queue.as_ref(), &mut task).await.unwrap();
    let view = app
        .status()
        .wait_terminal(&id, Duration::from_secs(2))
        .await
        .unwrap();
    workers.shutdown_and_join().await;

    assert_eq!(view.status, TaskStatus::Failed);
    let events = events.events().await;
    match events.as_slice() {
        [DomainEvent::TaskFailed { meta, errors }] => {
            assert_eq!(meta.owner_user_id, 42);
            assert_eq!((meta.quota_id, meta.quota_amount), (7, 120));
            assert!(meta.has_quota());
            assert_eq!(errors, &vec!["vendor unavailable".to_string()]);
        }
        other => panic!("unexpected events: {other:?}"),
    }
}
