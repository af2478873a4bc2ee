//! Errors - エラー型と分類
//!
//! - `HandlerError`: handler 作者が返すエラー
//! - `HandlerFault`: handler 実行 1 回分の異常（エラー / panic / タイムアウト）
//! - `ExecutionError`: executor が配送 1 件について返すエラー
//!
//! 古い配送（stale）は破棄であってエラーではないので、ここには含めない。

use std::time::Duration;

use thiserror::Error;

use super::{TaskId, TaskKind};
use crate::typed::CodecError;

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（再配送で直る可能性がある）
/// - Permanent: 恒久的なエラー（再配送しても無意味）
/// - Infrastructure: インフラエラー（台帳・キューの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

impl ErrorKind {
    /// Whether handing the delivery back to the transport could help.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}

/// Error returned by a task handler.
///
/// `Display` is the bare message: it is what lands in the ledger's `errors` list.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, using its `Display` as the message.
    pub fn from_source<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Abnormal end of one handler invocation.
#[derive(Debug, Error)]
pub enum HandlerFault {
    #[error(transparent)]
    Failed(#[from] HandlerError),

    #[error("panic: {0}")]
    Panicked(String),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    #[error("handler aborted before completion")]
    Aborted,
}

/// Why a delivery could not be completed.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("decode payload for kind={kind}: {source}")]
    Decode {
        kind: TaskKind,
        #[source]
        source: CodecError,
    },

    #[error("no handler registered for kind={0}")]
    UnknownTaskKind(TaskKind),

    #[error("task {task_id} failed: {fault}")]
    Handler {
        task_id: TaskId,
        #[source]
        fault: HandlerFault,
    },
}

impl ExecutionError {
    /// Decode and unknown-kind errors can never be fixed by redelivery.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Decode { .. } | ExecutionError::UnknownTaskKind(_) => {
                ErrorKind::Permanent
            }
            ExecutionError::Handler { .. } => ErrorKind::Transient,
        }
    }
}
