//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID
//! QueryId と RequestId はどちらも ULID を内部に持ちますが、
//! Phantom type で区別しているので取り違えはコンパイルエラーになります。
//!
//! - **QueryId**: query store 側のレコードのキー
//! - **RequestId**: in-flight transaction と query を突き合わせるためのキー
//!
//! reaper の突き合わせは RequestId の完全一致だけで行います。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"query-", "req-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// ```ignore
/// let query_id: QueryId = Id::from(Ulid::new());
/// let request_id: RequestId = Id::from(Ulid::new());
/// // let _: QueryId = request_id; // <- does not compile
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 新しいランダムな ID（テストやデモ用）
    pub fn random() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Query record のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Query {}

impl IdMarker for Query {
    fn prefix() -> &'static str {
        "query-"
    }
}

/// Request（transaction の相関キー）のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Request {}

impl IdMarker for Request {
    fn prefix() -> &'static str {
        "req-"
    }
}

/// Identifier of a persisted async query record.
pub type QueryId = Id<Query>;

/// Identifier correlating a query record with its in-flight transaction.
pub type RequestId = Id<Request>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        let ulid = Ulid::new();
        let query = QueryId::from_ulid(ulid);
        let request = RequestId::from_ulid(ulid);

        assert_eq!(query.as_ulid(), request.as_ulid());
        assert_eq!(query.to_string(), format!("query-{ulid}"));
        assert_eq!(request.to_string(), format!("req-{ulid}"));
    }

    #[test]
    fn request_id_serializes_as_bare_ulid() {
        let request = RequestId::random();
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, format!("\"{}\"", request.as_ulid()));

        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<QueryId>(), size_of::<Ulid>());
        assert_eq!(size_of::<RequestId>(), 16);
    }
}
