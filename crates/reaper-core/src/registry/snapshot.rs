//! Immutable point-in-time view of the transaction registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::RequestId;
use crate::ports::TransactionHandle;

pub(crate) type Entries = HashMap<RequestId, Arc<dyn TransactionHandle>>;

/// Snapshot of the registry taken atomically at one instant.
///
/// Design:
/// - Shares the map with the registry (copy-on-write), so taking one is O(1).
/// - Later register/remove calls never show up here, and never block on it.
#[derive(Clone)]
pub struct RegistrySnapshot {
    entries: Arc<Entries>,
}

impl RegistrySnapshot {
    pub(crate) fn new(entries: Arc<Entries>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
