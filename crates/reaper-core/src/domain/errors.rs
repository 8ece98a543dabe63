//! Errors - エラー型と分類
//!
//! フェーズごとに型を分けて、どこで何が失敗したかを区別できるようにします。
//! - StoreError: query store の参照失敗（tick 全体を中断）
//! - CancelError: 個々の transaction の cancel 失敗（その候補だけ失敗扱い）
//! - RegistryError: registry への登録失敗
//! - TransitionError: query status の不正な遷移

use thiserror::Error;

use super::ids::{QueryId, RequestId};
use super::query::QueryStatus;

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（次の tick で自然にリトライされる）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（store の障害など）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// query store の参照失敗
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("query store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed query record {query_id}: {reason}")]
    Malformed { query_id: QueryId, reason: String },

    #[error("query {0} not found")]
    NotFound(QueryId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) => ErrorKind::Infrastructure,
            StoreError::Malformed { .. } => ErrorKind::Permanent,
            StoreError::NotFound(_) | StoreError::Transition(_) => ErrorKind::Permanent,
        }
    }
}

/// 個々の transaction handle の cancel 失敗
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("cancel failed for {request_id}: {reason}")]
    Failed { request_id: RequestId, reason: String },

    #[error("cancel panicked for {request_id}")]
    Panicked { request_id: RequestId },
}

/// TransactionRegistry の操作エラー
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("transaction {0} is already registered")]
    AlreadyRegistered(RequestId),
}

/// 終端状態からの遷移など、許されない status 遷移
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition for {query_id}: {from} -> {to}")]
pub struct TransitionError {
    pub query_id: QueryId,
    pub from: QueryStatus,
    pub to: QueryStatus,
}

/// ReaperError は tick を中断させるエラー
#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("query store lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("reaper tick panicked: {0}")]
    Panicked(String),
}

impl ReaperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReaperError::Store(StoreError::Unavailable(_)) => ErrorKind::Transient,
            ReaperError::Store(e) => e.kind(),
            ReaperError::Panicked(_) => ErrorKind::Permanent,
        }
    }
}
