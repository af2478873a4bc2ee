//! Domain model (ids, envelope, payload metadata, ledger records, errors, events).

pub mod envelope;
pub mod errors;
pub mod events;
pub mod ids;
pub mod meta;
pub mod status;
pub mod task_kind;

pub use self::envelope::TaskEnvelope;
pub use self::errors::{ErrorKind, ExecutionError, HandlerError, HandlerFault};
pub use self::events::DomainEvent;
pub use self::ids::TaskId;
pub use self::meta::{StalePolicy, TaskMeta};
pub use self::status::{StatusRecord, TaskResult, TaskStatus};
pub use self::task_kind::TaskKind;
