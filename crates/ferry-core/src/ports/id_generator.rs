//! IdGenerator port - タスク ID 採番の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）
//!
//! ULID は時刻でソートでき、複数ノードで調整なしに採番できる。

use ulid::Ulid;

use crate::domain::TaskId;
use crate::ports::Clock;

/// # Thread Safety
/// - `Send + Sync` を要求（複数の producer から使える）
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// UlidGenerator は Clock の時刻を timestamp 部に使う
///
/// FixedClock を使えば timestamp 部分が決定的になる（ランダム部は残る）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        TaskId::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
