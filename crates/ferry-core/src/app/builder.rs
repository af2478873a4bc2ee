//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 指定されなかった port はデフォルト実装で埋める

use std::sync::Arc;

use super::executor::TaskExecutor;
use super::producer::Producer;
use super::status::StatusQuery;
use super::worker_loop::WorkerGroup;
use crate::config::{ConfigError, EngineConfig};
use crate::domain::TaskKind;
use crate::impls::{InMemoryDeliveryQueue, InMemoryStatusLedger};
use crate::ports::{
    Clock, DeliveryQueue, EventSink, IdGenerator, NoopEventSink, StatusLedger, SystemClock,
    UlidGenerator,
};
use crate::typed::{DynHandler, Handler, HandlerRegistry, RawHandler, RegistryError, Task};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .with_config(config)
///     .register::<MailTask, _>(MailSendHandler::new(mailer, prefix))?
///     .expect_tasks(&[MAIL_SEND_KIND])
///     .build()?;
/// let workers = app.spawn_workers(queue);
/// ```
///
/// # Fail-fast 設計
/// - expect_tasks() で期待される kind を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    registry: HandlerRegistry,
    expected_tasks: Option<Vec<TaskKind>>,
    config: EngineConfig,
    ledger: Option<Arc<dyn StatusLedger>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<dyn EventSink>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task kinds: {0:?}. These tasks were expected but not registered.")]
    MissingTaskKinds(Vec<TaskKind>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            expected_tasks: None,
            config: EngineConfig::default(),
            ledger: None,
            clock: None,
            events: None,
            ids: None,
        }
    }

    pub fn register<T: Task, H: Handler<T>>(mut self, handler: H) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn register_raw<H: RawHandler>(
        mut self,
        kind: impl Into<TaskKind>,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register_raw(kind, handler)?;
        Ok(self)
    }

    pub fn register_dyn(mut self, handler: Arc<dyn DynHandler>) -> Result<Self, RegistryError> {
        self.registry.register_dyn(handler)?;
        Ok(self)
    }

    /// 期待される kind のリストを設定
    pub fn expect_tasks(mut self, kinds: &[&str]) -> Self {
        self.expected_tasks = Some(kinds.iter().map(|&k| TaskKind::new(k)).collect());
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn StatusLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - 設定値の検証（ConfigError）
    /// - expect_tasks() の kind が全て登録されているか（MissingTaskKinds）
    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        if let Some(expected_tasks) = &self.expected_tasks {
            let missing_tasks: Vec<TaskKind> = expected_tasks
                .iter()
                .filter(|kind| !self.registry.contains(kind))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskKinds(missing_tasks));
            }
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryStatusLedger::new(Arc::clone(&clock))));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let events = self.events.unwrap_or_else(|| Arc::new(NoopEventSink));

        let registry = Arc::new(self.registry);
        let executor = Arc::new(
            TaskExecutor::new(Arc::clone(&registry), Arc::clone(&ledger), Arc::clone(&clock))
                .with_event_sink(events)
                .with_stale_window(self.config.stale_window())
                .with_handler_timeout(self.config.handler_timeout()),
        );

        tracing::info!(
            kinds = ?registry.registered_kinds(),
            workers = self.config.workers,
            stale_window_secs = self.config.stale_window_secs,
            "app built"
        );

        Ok(App {
            config: self.config,
            registry,
            ledger,
            ids,
            executor,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wired, immutable application.
pub struct App {
    config: EngineConfig,
    registry: Arc<HandlerRegistry>,
    ledger: Arc<dyn StatusLedger>,
    ids: Arc<dyn IdGenerator>,
    executor: Arc<TaskExecutor>,
}

impl App {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn executor(&self) -> Arc<TaskExecutor> {
        Arc::clone(&self.executor)
    }

    /// Producer that records `pending` in the app's ledger.
    pub fn producer(&self) -> Producer {
        Producer::new(Arc::clone(&self.ids)).with_ledger(Arc::clone(&self.ledger))
    }

    pub fn status(&self) -> StatusQuery {
        StatusQuery::new(Arc::clone(&self.ledger))
    }

    /// In-memory transport configured from `max_delivery_attempts` and the retry settings.
    pub fn in_memory_queue(&self) -> InMemoryDeliveryQueue {
        InMemoryDeliveryQueue::new(
            self.config.retry_policy(),
            self.config.max_delivery_attempts,
        )
    }

    /// Spawn `config.workers` workers on `queue`.
    pub fn spawn_workers(&self, queue: Arc<dyn DeliveryQueue>) -> WorkerGroup {
        WorkerGroup::spawn(self.config.workers, queue, self.executor())
    }
}
