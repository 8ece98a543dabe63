//! ReaperBuilder - reaper の構築とワイヤリング
//!
//! 起動時に足りない部品や不正な設定値を検出します（Fail-fast 設計）。

use std::sync::Arc;

use crate::app::config::{ConfigError, ReaperConfig};
use crate::app::reaper::CancellationReaper;
use crate::app::status::ReaperMetrics;
use crate::ports::{Clock, QueryStore, SystemClock};
use crate::registry::TransactionRegistry;

/// ReaperBuilder
///
/// # 使用例
/// ```ignore
/// let reaper = ReaperBuilder::new()
///     .max_run_time_secs(3600)
///     .registry(registry.clone())
///     .store(store)
///     .build()?;
/// ```
///
/// - registry と store は必須（実行側と共有するため暗黙には作らない）
/// - clock を省略すると SystemClock
/// - metrics を省略すると新しい ReaperMetrics
#[derive(Default)]
pub struct ReaperBuilder {
    max_run_time_secs: Option<u64>,
    interval_secs: Option<u64>,
    registry: Option<TransactionRegistry>,
    store: Option<Arc<dyn QueryStore>>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<Arc<ReaperMetrics>>,
}

/// BuildError は reaper 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ReaperBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ReaperConfig) -> Self {
        self.max_run_time_secs = Some(config.max_run_time_secs());
        self.interval_secs = Some(config.interval().as_secs());
        self
    }

    pub fn max_run_time_secs(mut self, secs: u64) -> Self {
        self.max_run_time_secs = Some(secs);
        self
    }

    pub fn interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = Some(secs);
        self
    }

    pub fn registry(mut self, registry: TransactionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn QueryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn metrics(mut self, metrics: Arc<ReaperMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<CancellationReaper, BuildError> {
        let max_run_time_secs = self
            .max_run_time_secs
            .ok_or(BuildError::MissingComponent("max_run_time_secs"))?;
        let config = ReaperConfig::new(
            max_run_time_secs,
            self.interval_secs
                .unwrap_or(ReaperConfig::DEFAULT_INTERVAL_SECS),
        )?;
        let registry = self
            .registry
            .ok_or(BuildError::MissingComponent("registry"))?;
        let store = self.store.ok_or(BuildError::MissingComponent("store"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = self.metrics.unwrap_or_default();

        Ok(CancellationReaper::new(
            config, registry, store, clock, metrics,
        ))
    }
}
