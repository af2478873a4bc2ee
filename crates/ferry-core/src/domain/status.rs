//! Status ledger records.
//!
//! 1 タスク ID につき 1 行。終端書き込みは常に全体の上書き（last-write-wins）。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Lifecycle status of a task.
///
/// `Pending` is the initial state and is only materialized when the producer has
/// a ledger attached. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result stored next to the status.
///
/// Empty (`{}`) for success and pending, `{"errors": [...]}` for failures.
/// Only summarized messages end up here, never panic traces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl TaskResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub result: TaskResult,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, "\"pending\"")]
    #[case(TaskStatus::Success, "\"success\"")]
    #[case(TaskStatus::Failed, "\"failed\"")]
    fn status_serializes_lowercase(#[case] status: TaskStatus, #[case] expected: &str) {
        assert_eq!(serde_json::to_string(&status).unwrap(), expected);
        assert_eq!(format!("\"{status}\""), expected);
    }

    #[test]
    fn empty_result_is_an_empty_object() {
        let s = serde_json::to_string(&TaskResult::empty()).unwrap();
        assert_eq!(s, "{}");

        let back: TaskResult = serde_json::from_str("{}").unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn failure_result_carries_error_list() {
        let v = serde_json::to_value(TaskResult::from_error("smtp timeout")).unwrap();
        assert_eq!(v, serde_json::json!({ "errors": ["smtp timeout"] }));
    }

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }
}
