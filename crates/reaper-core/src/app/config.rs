//! ReaperConfig - reaper の設定値
//!
//! 値の検証は構築時に一度だけ行います（Fail-fast）。

use std::time::Duration;

use chrono::TimeDelta;

/// ConfigError は設定値の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_run_time_secs must be greater than zero")]
    ZeroMaxRunTime,

    #[error("max_run_time_secs={0} is out of range")]
    MaxRunTimeOutOfRange(u64),

    #[error("interval_secs must be greater than zero")]
    ZeroInterval,
}

/// ReaperConfig
///
/// - `max_run_time`: これより古い query が reaper の対象になる（秒単位）
/// - `interval`: scheduler が reaper を起動する間隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    max_run_time_secs: u64,
    max_run_time: TimeDelta,
    interval: Duration,
}

impl ReaperConfig {
    pub const DEFAULT_MAX_RUN_TIME_SECS: u64 = 3600;
    pub const DEFAULT_INTERVAL_SECS: u64 = 60;

    pub fn new(max_run_time_secs: u64, interval_secs: u64) -> Result<Self, ConfigError> {
        if max_run_time_secs == 0 {
            return Err(ConfigError::ZeroMaxRunTime);
        }
        if interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let max_run_time = i64::try_from(max_run_time_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or(ConfigError::MaxRunTimeOutOfRange(max_run_time_secs))?;
        Ok(Self {
            max_run_time_secs,
            max_run_time,
            interval: Duration::from_secs(interval_secs),
        })
    }

    /// max_run_time だけ指定し、interval はデフォルト
    pub fn with_max_run_time_secs(max_run_time_secs: u64) -> Result<Self, ConfigError> {
        Self::new(max_run_time_secs, Self::DEFAULT_INTERVAL_SECS)
    }

    pub fn max_run_time_secs(&self) -> u64 {
        self.max_run_time_secs
    }

    pub fn max_run_time(&self) -> TimeDelta {
        self.max_run_time
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            max_run_time_secs: Self::DEFAULT_MAX_RUN_TIME_SECS,
            max_run_time: TimeDelta::seconds(Self::DEFAULT_MAX_RUN_TIME_SECS as i64),
            interval: Duration::from_secs(Self::DEFAULT_INTERVAL_SECS),
        }
    }
}
