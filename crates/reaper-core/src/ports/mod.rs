//! Ports - 抽象化レイヤー
//!
//! 外部の協調相手（query store、実行中の transaction、時刻）への
//! インターフェースをここで定義します。reaper はこれらの trait だけに依存します。

pub mod clock;
pub mod id_generator;
pub mod query_store;
pub mod transaction;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::query_store::QueryStore;
pub use self::transaction::TransactionHandle;
