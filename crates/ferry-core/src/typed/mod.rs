//! Typed - 型付き Task API
//!
//! kind の typo を型で排除し、Handler との対応付けを静的に保証する。
//!
//! # 二層構造
//! - **表層（Typed）**: `Task` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` / `PreparedTask` trait - object-safe, type erasure

pub mod codec;
pub mod handler;
pub mod registry;
pub mod task;

pub use self::codec::{CodecError, PayloadCodec};
pub use self::handler::{
    DynHandler, Handler, PreparedTask, RawDynHandler, RawHandler, TaskContext, TaskHeader,
    TypedHandler,
};
pub use self::registry::{HandlerRegistry, RegistryError};
pub use self::task::Task;
