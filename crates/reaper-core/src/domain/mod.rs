//! Domain model (ids, query records, errors).

pub mod errors;
pub mod ids;
pub mod query;

pub use self::errors::{
    CancelError, ErrorKind, ReaperError, RegistryError, StoreError, TransitionError,
};
pub use self::ids::{Id, IdMarker, QueryId, RequestId};
pub use self::query::{QueryRecord, QueryStatus};
