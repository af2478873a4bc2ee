//! テスト用のタスク・handler・port 実装

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{HandlerError, StatusRecord, TaskId, TaskResult, TaskStatus};
use crate::ports::{LedgerError, StatusLedger};
use crate::tasks::mail::{MailError, Mailer};
use crate::typed::{Handler, Task, TaskContext};

/// Fixed "now" shared by the unit tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    #[default]
    Succeed,
    Fail(String),
    Panic(String),
    SleepMs(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub quota_id: i64,
    #[serde(default)]
    pub quota_amount: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub behavior: Behavior,
}

impl SampleTask {
    /// Created at `t0()`.
    pub fn fresh(id: &str) -> Self {
        Self {
            id: id.to_string(),
            user_id: 0,
            quota_id: 0,
            quota_amount: 0,
            created_at: t0(),
            behavior: Behavior::Succeed,
        }
    }

    pub fn owned_by(mut self, user_id: i64) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_quota(mut self, quota_id: i64, amount: i64) -> Self {
        self.quota_id = quota_id;
        self.quota_amount = amount;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.behavior = Behavior::Fail(message.to_string());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.behavior = Behavior::Panic(message.to_string());
        self
    }

    pub fn sleeping(mut self, ms: u64) -> Self {
        self.behavior = Behavior::SleepMs(ms);
        self
    }
}

impl Task for SampleTask {
    const KIND: &'static str = "test:sample";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn title(&self) -> String {
        format!("sample {}", self.id)
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

/// Counts invocations and acts out the sample's `behavior`.
#[derive(Default)]
pub struct SampleHandler {
    calls: Arc<AtomicU32>,
    remaining_failures: AtomicU32,
}

impl SampleHandler {
    /// Fails the first `n` invocations, whatever the sample says.
    pub fn failing_first(n: u32) -> Self {
        Self {
            calls: Arc::default(),
            remaining_failures: AtomicU32::new(n),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Handler<SampleTask> for SampleHandler {
    async fn handle(&self, _ctx: &TaskContext, task: SampleTask) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let left = self.remaining_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(HandlerError::new(format!("intentional failure (left={left})")));
        }

        match task.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(message) => Err(HandlerError::new(message)),
            Behavior::Panic(message) => panic!("{message}"),
            Behavior::SleepMs(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    fail_with: Option<String>,
}

impl RecordingMailer {
    pub fn failing_with(message: &str) -> Self {
        Self {
            sent: Arc::default(),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        if let Some(message) = &self.fail_with {
            return Err(MailError::new(message.clone()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Ledger whose storage is always down.
pub struct UnavailableLedger;

#[async_trait]
impl StatusLedger for UnavailableLedger {
    async fn update(
        &self,
        _task_id: &TaskId,
        _status: TaskStatus,
        _result: TaskResult,
    ) -> Result<(), LedgerError> {
        Err(LedgerError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _task_id: &TaskId) -> Result<StatusRecord, LedgerError> {
        Err(LedgerError::Unavailable("connection refused".to_string()))
    }
}
