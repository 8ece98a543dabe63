//! InMemoryQueryStore - 開発・テスト用の query store
//!
//! 本番では DB が正本になります。ここでは HashMap を Mutex で守るだけの
//! 最小実装ですが、status 遷移の単調性（終端からは戻らない）は同じように守ります。
//!
//! lock は `.await` をまたいで保持しないので、std の Mutex で足ります。
//! 書き込みが同期なので `TransactionContext::commit()` の中からそのまま呼べます。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{QueryId, QueryRecord, QueryStatus, RequestId, StoreError};
use crate::ports::{Clock, IdGenerator, QueryStore, UlidGenerator};

pub struct InMemoryQueryStore {
    records: Mutex<HashMap<QueryId, QueryRecord>>,
    clock: Arc<dyn Clock>,
    ids: UlidGenerator<Arc<dyn Clock>>,
}

impl InMemoryQueryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ids: UlidGenerator::new(Arc::clone(&clock)),
            clock,
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<QueryId, QueryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 新しい query を QUEUED で登録
    pub fn submit(&self, request_id: RequestId) -> QueryRecord {
        let record = QueryRecord::new(self.ids.generate_query_id(), request_id, self.clock.now());
        self.records().insert(record.id, record.clone());
        tracing::debug!(query_id = %record.id, request_id = %request_id, "query submitted");
        record
    }

    pub fn get(&self, id: QueryId) -> Option<QueryRecord> {
        self.records().get(&id).cloned()
    }

    pub fn find_by_request(&self, request_id: RequestId) -> Option<QueryRecord> {
        self.records()
            .values()
            .find(|r| r.request_id == request_id)
            .cloned()
    }

    /// status を遷移させる（終端からの遷移は TransitionError）
    pub fn transition(&self, id: QueryId, next: QueryStatus) -> Result<QueryRecord, StoreError> {
        let now = self.clock.now();
        let mut records = self.records();
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.transition(next, now)?;
        tracing::debug!(query_id = %id, status = %next, "query status updated");
        Ok(record.clone())
    }

    /// ユーザーからの cancel 要求
    ///
    /// transaction を止めるのは reaper の仕事で、ここでは status を CANCELLED にするだけ。
    pub fn cancel(&self, id: QueryId) -> Result<QueryRecord, StoreError> {
        self.transition(id, QueryStatus::Cancelled)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

#[async_trait]
impl QueryStore for InMemoryQueryStore {
    async fn find_active(
        &self,
        statuses: &[QueryStatus],
        not_newer_than: DateTime<Utc>,
    ) -> Result<Vec<QueryRecord>, StoreError> {
        let records = self.records();
        let mut found: Vec<QueryRecord> = records
            .values()
            .filter(|r| statuses.contains(&r.status) && r.created_on <= not_newer_than)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_on);
        Ok(found)
    }
}
