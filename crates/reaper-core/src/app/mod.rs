//! App - アプリケーション層
//!
//! ports と registry を組み合わせて reaper を組み立てます。
//!
//! # 主要コンポーネント
//! - **ReaperBuilder**: 構築とワイヤリング
//! - **ReaperConfig**: 設定値（max_run_time, interval）
//! - **CancellationReaper**: 1 tick 分の突き合わせと cancel
//! - **ReaperLoop**: 一定間隔で reaper を起動する scheduler
//! - **ReaperMetrics**: tick の結果を積み上げるカウンタ

pub mod builder;
pub mod config;
pub mod reaper;
pub mod reaper_loop;
pub mod status;

pub use self::builder::{BuildError, ReaperBuilder};
pub use self::config::{ConfigError, ReaperConfig};
pub use self::reaper::{CancellationReaper, TickReport, should_cancel};
pub use self::reaper_loop::ReaperLoop;
pub use self::status::ReaperMetrics;
