//! Task identity.
//!
//! ペイロードの `id` は外部から持ち込まれることもある不透明な文字列なので、
//! ULID そのものではなく String の newtype として扱う。
//! 新規採番は `ports::IdGenerator`（ULID ベース）が担当する。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a task. The sole key for status ledger lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// ULID から TaskId を作成（正規の 26 文字表現）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty ids only exist before the producer has assigned one.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
