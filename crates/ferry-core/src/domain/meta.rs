//! TaskMeta - decode 済みタスクの契約フィールドのスナップショット
//!
//! executor はペイロードの具体型を知らないので、ログ・鮮度判定・台帳キー・
//! イベントにはここに写し取った値を使う。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{TaskId, TaskKind};
use crate::typed::Task;

/// How a task kind wants its staleness judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Use the engine-wide window from `EngineConfig`.
    #[default]
    EngineDefault,

    /// Use a kind-specific window.
    Within(Duration),

    /// Never discard, however old.
    Never,
}

/// Owned view of the payload contract, taken right after decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskMeta {
    pub id: TaskId,
    pub kind: TaskKind,
    pub title: String,

    /// 0 means "system task, no owner".
    pub owner_user_id: i64,

    /// 0 means "no quota reservation tied to this task".
    pub quota_id: i64,
    pub quota_amount: i64,

    pub created_at: DateTime<Utc>,

    #[serde(skip)]
    pub stale_policy: StalePolicy,
}

impl TaskMeta {
    pub fn of<T: Task>(task: &T) -> Self {
        Self {
            id: TaskId::new(task.id()),
            kind: TaskKind::new(T::KIND),
            title: task.title(),
            owner_user_id: task.owner_user_id(),
            quota_id: task.quota_id(),
            quota_amount: task.quota_amount(),
            created_at: task.created_at(),
            stale_policy: task.stale_policy(),
        }
    }

    pub fn has_quota(&self) -> bool {
        self.quota_id != 0
    }

    /// Age relative to `now`. Negative when `created_at` lies in the future.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }

    /// Window that applies to this task, given the engine default.
    pub fn stale_window(&self, engine_default: Option<Duration>) -> Option<Duration> {
        match self.stale_policy {
            StalePolicy::EngineDefault => engine_default,
            StalePolicy::Within(window) => Some(window),
            StalePolicy::Never => None,
        }
    }

    /// `now - created_at > window`. Exactly at the boundary is still fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, engine_default: Option<Duration>) -> bool {
        let Some(window) = self.stale_window(engine_default) else {
            return false;
        };
        match chrono::Duration::from_std(window) {
            Ok(window) => self.age(now) > window,
            // larger than chrono can represent: nothing is that old
            Err(_) => false,
        }
    }
}
