//! HandlerRegistry - kind → Handler の対応表
//!
//! # 設計
//! - 起動時に単一スレッドで組み立てる（mutable）
//! - ワーカー起動後は `Arc<HandlerRegistry>` で共有し、読むだけ（immutable）
//!
//! 実行時登録を許さないので、ホットパスでロックは要らない。

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, RawDynHandler, RawHandler, TypedHandler};
use super::task::Task;
use crate::domain::TaskKind;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for task kind '{0}' is already registered")]
    DuplicateHandler(TaskKind),

    #[error("no handler registered for task kind '{0}'")]
    UnknownTaskKind(TaskKind),
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn DynHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler under `T::KIND`.
    pub fn register<T: Task, H: Handler<T>>(&mut self, handler: H) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    /// Register a handler that works on the raw encoded payload.
    pub fn register_raw<H: RawHandler>(
        &mut self,
        kind: impl Into<TaskKind>,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(RawDynHandler::new(kind, handler)))
    }

    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let kind = TaskKind::new(handler.kind());
        if self.handlers.contains_key(&kind) {
            return Err(RegistryError::DuplicateHandler(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn resolve(&self, kind: &TaskKind) -> Result<Arc<dyn DynHandler>, RegistryError> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTaskKind(kind.clone()))
    }

    pub fn contains(&self, kind: &TaskKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
