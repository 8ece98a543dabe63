//! Async query record and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TransitionError;
use super::ids::{QueryId, RequestId};

/// Query status.
///
/// State transitions:
/// - Queued -> Processing -> Complete
/// - Queued -> Processing -> Failed
/// - Queued | Processing -> Cancelled (explicit user cancellation)
/// - Queued -> Failed (rejected before execution)
///
/// Terminal statuses never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    /// Submitted, waiting for an executor.
    Queued,

    /// Picked up by an executor; a transaction is (or is about to be) in flight.
    Processing,

    /// Finished and results were written.
    Complete,

    /// Cancelled by a user request or by the reaper.
    Cancelled,

    /// Execution failed.
    Failed,
}

impl QueryStatus {
    /// Statuses the reaper looks at: anything still running plus explicit cancellations.
    pub const REAPABLE: [QueryStatus; 3] = [
        QueryStatus::Cancelled,
        QueryStatus::Processing,
        QueryStatus::Queued,
    ];

    /// Is this a terminal status (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryStatus::Complete | QueryStatus::Cancelled | QueryStatus::Failed
        )
    }

    /// Is `next` a legal successor of `self`?
    pub fn can_transition_to(self, next: QueryStatus) -> bool {
        match self {
            QueryStatus::Queued => next != QueryStatus::Queued,
            QueryStatus::Processing => next.is_terminal(),
            QueryStatus::Complete | QueryStatus::Cancelled | QueryStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryStatus::Queued => "QUEUED",
            QueryStatus::Processing => "PROCESSING",
            QueryStatus::Complete => "COMPLETE",
            QueryStatus::Cancelled => "CANCELLED",
            QueryStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Read model of an async query as persisted by the query store.
///
/// `request_id` must equal the transaction registry key for the reaper to
/// correlate the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: QueryId,
    pub request_id: RequestId,
    pub status: QueryStatus,

    /// Submission time, immutable after creation.
    pub created_on: DateTime<Utc>,

    /// Time of the last status transition.
    pub updated_on: DateTime<Utc>,
}

impl QueryRecord {
    /// A freshly submitted (queued) query.
    pub fn new(id: QueryId, request_id: RequestId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            request_id,
            status: QueryStatus::Queued,
            created_on: now,
            updated_on: now,
        }
    }

    /// Move to `next`, stamping `updated_on`.
    pub fn transition(
        &mut self,
        next: QueryStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                query_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_on = now;
        Ok(())
    }

    /// Whole seconds between `updated_on` and `now`, in either direction.
    ///
    /// Truncates toward zero, so 7.9s counts as 7.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.updated_on).num_seconds().unsigned_abs()
    }
}
