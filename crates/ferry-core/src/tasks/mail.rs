//! mail:send - メール送信タスク
//!
//! 件名には設定の prefix（既定 `【optima】`）を付けて送る。
//! 送信失敗は handler のエラーとしてそのまま返し、台帳には送信エラーの文言が残る。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::HandlerError;
use crate::typed::{Handler, Task, TaskContext};

pub const MAIL_SEND_KIND: &str = "mail:send";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailTask {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl MailTask {
    pub fn new(
        to: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            to,
            subject: subject.into(),
            body: body.into(),
            created_at,
        }
    }
}

impl Task for MailTask {
    const KIND: &'static str = MAIL_SEND_KIND;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn title(&self) -> String {
        self.subject.clone()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MailError(pub String);

impl MailError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Mailer port - 実際の送信手段
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError>;
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for Arc<M> {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        (**self).send(to, subject, body).await
    }
}

pub struct MailSendHandler<M> {
    mailer: M,
    subject_prefix: String,
}

impl<M: Mailer> MailSendHandler<M> {
    pub fn new(mailer: M, subject_prefix: impl Into<String>) -> Self {
        Self {
            mailer,
            subject_prefix: subject_prefix.into(),
        }
    }

    fn subject_for(&self, task: &MailTask) -> String {
        format!("{}{}", self.subject_prefix, task.subject)
    }
}

#[async_trait]
impl<M: Mailer> Handler<MailTask> for MailSendHandler<M> {
    async fn handle(&self, ctx: &TaskContext, task: MailTask) -> Result<(), HandlerError> {
        let subject = self.subject_for(&task);
        self.mailer
            .send(&task.to, &subject, &task.body)
            .await
            .map_err(|err| {
                tracing::warn!(
                    task_id = %ctx.task_id(),
                    recipients = task.to.len(),
                    error = %err,
                    "send mail failed"
                );
                HandlerError::from_source(err)
            })
    }
}
