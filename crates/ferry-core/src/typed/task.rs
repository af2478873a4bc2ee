//! Task trait - ペイロード契約
//!
//! # 学習ポイント
//! - Associated Constants (`const KIND`)
//! - デフォルト実装付きメソッドで「0 = 該当なし」を表現
//!
//! 汎用インフラ（executor, producer, ログ）はこの trait 越しにしか
//! ペイロードを見ない。業務フィールドは各実装が自由に持つ。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::StalePolicy;

/// Task は kind タグとペイロード型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct ResizeImage {
///     #[serde(default)]
///     id: String,
///     url: String,
///     created_at: DateTime<Utc>,
/// }
///
/// impl Task for ResizeImage {
///     const KIND: &'static str = "image:resize";
///
///     fn id(&self) -> &str { &self.id }
///     fn set_id(&mut self, id: String) { self.id = id; }
///     fn title(&self) -> String { format!("resize {}", self.url) }
///     fn created_at(&self) -> DateTime<Utc> { self.created_at }
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize` / `DeserializeOwned`: 配送エンベロープとの相互変換のため
/// - `Send + Sync + 'static`: ワーカー間で安全に受け渡すため
///
/// Every accessor is a plain field read and must be safe to call concurrently.
/// `set_id` is the only mutation, made once by the producer before submission.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// kind タグ（`{domain}:{action}`）
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Human-readable label for logs and alerts.
    fn title(&self) -> String;

    /// 0 means "system task, no owner".
    fn owner_user_id(&self) -> i64 {
        0
    }

    /// 0 means "no quota reservation".
    fn quota_id(&self) -> i64 {
        0
    }

    fn quota_amount(&self) -> i64 {
        0
    }

    fn created_at(&self) -> DateTime<Utc>;

    fn stale_policy(&self) -> StalePolicy {
        StalePolicy::EngineDefault
    }
}
