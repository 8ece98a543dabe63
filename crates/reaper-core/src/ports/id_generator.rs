//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{QueryId, RequestId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は query / request の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_query_id(&self) -> QueryId;

    fn generate_request_id(&self) -> RequestId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って timestamp 部分を決めるので、
/// FixedClock を渡せば timestamp が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_query_id(&self) -> QueryId {
        QueryId::from(self.next_ulid())
    }

    fn generate_request_id(&self) -> RequestId {
        RequestId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_request_id();
        let id2 = id_gen.generate_request_id();

        assert_ne!(id1, id2);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let query = id_gen.generate_query_id();
        let request = id_gen.generate_request_id();

        // ランダム部分は異なるが timestamp 部分は同じ
        assert_ne!(query.as_ulid(), request.as_ulid());
        assert_eq!(query.as_ulid().timestamp_ms(), request.as_ulid().timestamp_ms());
        assert_eq!(
            request.as_ulid().timestamp_ms(),
            fixed_time.timestamp_millis() as u64
        );
        assert!(query.to_string().starts_with("query-"));
        assert!(request.to_string().starts_with("req-"));
    }
}
