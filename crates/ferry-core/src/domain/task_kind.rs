//! TaskKind - handler を選択するタグ
//!
//! kind はペイロード本体には含めず、配送エンベロープ側で運ぶ。
//!
//! # 命名規約
//! - `{domain}:{action}`
//! - 例: `mail:send`

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(String);

impl TaskKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}
