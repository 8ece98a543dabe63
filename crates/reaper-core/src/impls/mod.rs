//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryQueryStore**: 開発用の query store
//! - **AbortTransaction**: tokio task を transaction として止める handle
//! - **spawn_tracked**: 実行側が registry への登録・解除を任せるためのヘルパー

pub mod abort_transaction;
pub mod inmem_query_store;

pub use self::abort_transaction::{
    AbortTransaction, TransactionCancelled, TransactionContext, spawn_tracked,
};
pub use self::inmem_query_store::InMemoryQueryStore;
