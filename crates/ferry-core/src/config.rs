//! EngineConfig - 実行エンジンの設定
//!
//! 読み込み順: デフォルト → JSON ファイル（任意）→ `FERRY_*` 環境変数

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::impls::RetryPolicy;

pub const ENV_STALE_WINDOW_SECS: &str = "FERRY_STALE_WINDOW_SECS";
pub const ENV_WORKERS: &str = "FERRY_WORKERS";
pub const ENV_HANDLER_TIMEOUT_SECS: &str = "FERRY_HANDLER_TIMEOUT_SECS";
pub const ENV_MAX_DELIVERY_ATTEMPTS: &str = "FERRY_MAX_DELIVERY_ATTEMPTS";
pub const ENV_MAIL_SUBJECT_PREFIX: &str = "FERRY_MAIL_SUBJECT_PREFIX";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deliveries older than this are discarded unrun. 0 disables the check.
    #[serde(default = "default_stale_window_secs")]
    pub stale_window_secs: u64,

    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound on a single handler invocation. None waits forever.
    #[serde(default)]
    pub handler_timeout_secs: Option<u64>,

    /// In-memory transport only: deliveries are marked dead after this many attempts.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,

    #[serde(default = "default_mail_subject_prefix")]
    pub mail_subject_prefix: String,
}

fn default_stale_window_secs() -> u64 {
    15 * 60
}

fn default_workers() -> usize {
    4
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    2_000
}

fn default_retry_multiplier() -> f64 {
    2.0
}

fn default_mail_subject_prefix() -> String {
    "【optima】".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_window_secs: default_stale_window_secs(),
            workers: default_workers(),
            handler_timeout_secs: None,
            max_delivery_attempts: default_max_delivery_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_multiplier: default_retry_multiplier(),
            mail_subject_prefix: default_mail_subject_prefix(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `FERRY_*` overrides from `lookup`.
    ///
    /// `FERRY_HANDLER_TIMEOUT_SECS=0` clears the timeout.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, ENV_STALE_WINDOW_SECS)? {
            self.stale_window_secs = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_WORKERS)? {
            self.workers = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, ENV_HANDLER_TIMEOUT_SECS)? {
            self.handler_timeout_secs = (v > 0).then_some(v);
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_DELIVERY_ATTEMPTS)? {
            self.max_delivery_attempts = v;
        }
        if let Some(prefix) = lookup(ENV_MAIL_SUBJECT_PREFIX) {
            self.mail_subject_prefix = prefix;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_delivery_attempts must be at least 1".into(),
            ));
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry_multiplier must be >= 1.0, got {}",
                self.retry_multiplier
            )));
        }
        Ok(())
    }

    /// None when the staleness check is disabled.
    pub fn stale_window(&self) -> Option<Duration> {
        (self.stale_window_secs > 0).then(|| Duration::from_secs(self.stale_window_secs))
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_delay_ms),
            self.retry_multiplier,
        )
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}
