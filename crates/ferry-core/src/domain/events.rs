//! Events - ドメインイベント
//!
//! executor が終端ごとに `EventSink` へ送る。課金側はここで
//! `TaskFailed` の quota 予約を見て返金する。

use serde::Serialize;

use super::{TaskId, TaskMeta};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskSucceeded {
        meta: TaskMeta,
    },
    TaskFailed {
        meta: TaskMeta,
        errors: Vec<String>,
    },
    /// Delivered too late and dropped without running the handler.
    TaskDiscarded {
        meta: TaskMeta,
        age_secs: i64,
    },
}

impl DomainEvent {
    pub fn meta(&self) -> &TaskMeta {
        match self {
            DomainEvent::TaskSucceeded { meta }
            | DomainEvent::TaskFailed { meta, .. }
            | DomainEvent::TaskDiscarded { meta, .. } => meta,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.meta().id
    }
}
