//! reaper-core
//!
//! Background reaper for long-running async queries.
//!
//! 実行中の transaction を持つ registry と、query の status を持つ store を
//! 定期的に突き合わせ、cancel 済み・実行時間超過の transaction を止めます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, query record / status, errors）
//! - **ports**: 抽象化レイヤー（QueryStore, TransactionHandle, Clock, IdGenerator）
//! - **registry**: TransactionRegistry とその snapshot
//! - **app**: reaper 本体、設定、builder、scheduler ループ、カウンタ
//! - **impls**: 実装（InMemoryQueryStore, AbortTransaction など開発用）
//! - **observability**: ログ初期化とカウンタの公開型

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod registry;

pub use app::{CancellationReaper, ReaperBuilder, ReaperConfig, ReaperLoop};
pub use registry::TransactionRegistry;
