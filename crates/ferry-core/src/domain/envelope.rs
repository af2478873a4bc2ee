//! TaskEnvelope - 配送用のメッセージ
//!
//! kind + シリアライズ済みペイロード（JSON bytes）+ 配送回数。
//! ペイロードの中身は executor が handler 経由で decode するまで触らない。

use serde::{Deserialize, Serialize};

use super::TaskKind;

/// Transport-ready message: the kind tag plus the encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    kind: TaskKind,
    payload: Vec<u8>,

    /// Delivery attempt, stamped by the transport (1-based). 0 until first delivery.
    #[serde(default)]
    attempt: u32,
}

impl TaskEnvelope {
    pub fn new(kind: TaskKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            attempt: 0,
        }
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}
