//! QueryStore port - async query の正本（source of truth）への読み取り口
//!
//! reaper が必要とするのは「status と作成時刻で絞り込んだ一覧」だけなので、
//! trait もその一点に絞っています。永続化の方法は実装側の責務です。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{QueryRecord, QueryStatus, StoreError};

/// QueryStore は async query のレコードを検索する
///
/// # 設計原則
/// - 読み取り専用（reaper は query record を書き換えない）
/// - `find_active` は `status ∈ statuses` かつ `created_on <= not_newer_than` のレコードを返す
/// - 返す順序は問わない
#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn find_active(
        &self,
        statuses: &[QueryStatus],
        not_newer_than: DateTime<Utc>,
    ) -> Result<Vec<QueryRecord>, StoreError>;
}
