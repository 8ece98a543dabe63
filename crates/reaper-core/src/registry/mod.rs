//! Transaction registry: request id -> in-flight transaction handle.
//!
//! Design:
//! - Owned explicitly and shared by cloning (all clones see the same entries).
//!   The execution side registers/removes, the reaper snapshots and cancels.
//! - The map lives behind `RwLock<Arc<..>>`. Writers copy-on-write through
//!   `Arc::make_mut`, readers clone the `Arc`. A snapshot therefore never
//!   observes a later mutation and never holds the lock while cancelling.
//! - Duplicate registration is rejected; the first handle stays in place.

mod snapshot;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::{CancelError, RegistryError, RequestId};
use crate::ports::TransactionHandle;

use self::snapshot::Entries;
pub use self::snapshot::RegistrySnapshot;

/// Result of a directed cancel against the live registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The handle was found and `cancel()` returned Ok.
    Requested,

    /// The transaction was deregistered before we got to it.
    AlreadyGone,
}

#[derive(Clone, Default)]
pub struct TransactionRegistry {
    entries: Arc<RwLock<Arc<Entries>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
        }
    }

    /// Register a live transaction.
    ///
    /// Fails with `AlreadyRegistered` if `id` is already present.
    pub fn register(
        &self,
        id: RequestId,
        handle: Arc<dyn TransactionHandle>,
    ) -> Result<(), RegistryError> {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        Arc::make_mut(&mut *guard).insert(id, handle);
        tracing::debug!(request_id = %id, "transaction registered");
        Ok(())
    }

    pub fn get(&self, id: &RequestId) -> Option<Arc<dyn TransactionHandle>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Deregister `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: &RequestId) -> Option<Arc<dyn TransactionHandle>> {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.contains_key(id) {
            return None;
        }
        let removed = Arc::make_mut(&mut *guard).remove(id);
        tracing::debug!(request_id = %id, "transaction deregistered");
        removed
    }

    /// Deregister `id` only if it still maps to `handle`.
    ///
    /// Used by the execution side when its transaction ends, so a later
    /// registration under the same id is left alone.
    pub fn remove_if_same(&self, id: &RequestId, handle: &Arc<dyn TransactionHandle>) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let same = guard
            .get(id)
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(handle)));
        if same {
            Arc::make_mut(&mut *guard).remove(id);
            tracing::debug!(request_id = %id, "transaction deregistered");
        }
        same
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        RegistrySnapshot::new(Arc::clone(&entries))
    }

    /// Cancel the live transaction registered under `id`.
    ///
    /// The lock is released before `cancel()` runs. A panicking handle is
    /// reported as `CancelError::Panicked` instead of unwinding into the caller.
    pub fn cancel(&self, id: &RequestId) -> Result<CancelOutcome, CancelError> {
        let Some(handle) = self.get(id) else {
            return Ok(CancelOutcome::AlreadyGone);
        };
        match catch_unwind(AssertUnwindSafe(|| handle.cancel())) {
            Ok(Ok(())) => Ok(CancelOutcome::Requested),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CancelError::Panicked { request_id: *id }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandle {
        cancels: AtomicUsize,
    }

    impl TransactionHandle for CountingHandle {
        fn cancel(&self) -> Result<(), CancelError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingHandle;

    impl TransactionHandle for PanickingHandle {
        fn cancel(&self) -> Result<(), CancelError> {
            panic!("driver exploded");
        }
    }

    #[test]
    fn register_and_get() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        registry
            .register(id, Arc::new(CountingHandle::default()))
            .unwrap();

        assert!(registry.get(&id).is_some());
        assert!(registry.get(&RequestId::random()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let first = Arc::new(CountingHandle::default());
        registry.register(id, first.clone()).unwrap();

        let result = registry.register(id, Arc::new(CountingHandle::default()));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(dup)) if dup == id));

        // the first handle is still the one that gets cancelled
        registry.cancel(&id).unwrap();
        assert_eq!(first.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        registry
            .register(id, Arc::new(CountingHandle::default()))
            .unwrap();

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_if_same_leaves_other_handles_alone() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let first: Arc<dyn TransactionHandle> = Arc::new(CountingHandle::default());
        let second: Arc<dyn TransactionHandle> = Arc::new(CountingHandle::default());
        registry.register(id, first.clone()).unwrap();

        assert!(!registry.remove_if_same(&id, &second));
        assert!(registry.get(&id).is_some());
        assert!(registry.remove_if_same(&id, &first));
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutations() {
        let registry = TransactionRegistry::new();
        let kept = RequestId::random();
        let removed = RequestId::random();
        registry
            .register(kept, Arc::new(CountingHandle::default()))
            .unwrap();
        registry
            .register(removed, Arc::new(CountingHandle::default()))
            .unwrap();

        let snapshot = registry.snapshot();
        registry.remove(&removed);
        let added = RequestId::random();
        registry
            .register(added, Arc::new(CountingHandle::default()))
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&kept));
        assert!(snapshot.contains(&removed));
        assert!(!snapshot.contains(&added));

        let live = registry.snapshot();
        assert!(!live.contains(&removed));
        assert!(live.contains(&added));
    }

    #[test]
    fn cancel_of_absent_id_is_not_an_error() {
        let registry = TransactionRegistry::new();
        let outcome = registry.cancel(&RequestId::random()).unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyGone);
    }

    #[test]
    fn cancel_after_removal_via_stale_snapshot_is_absorbed() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let handle = Arc::new(CountingHandle::default());
        registry.register(id, handle.clone()).unwrap();

        let snapshot = registry.snapshot();
        registry.remove(&id);

        assert!(snapshot.contains(&id));
        assert_eq!(registry.cancel(&id).unwrap(), CancelOutcome::AlreadyGone);
        assert_eq!(handle.cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_handle_becomes_cancel_error() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        registry.register(id, Arc::new(PanickingHandle)).unwrap();

        let err = registry.cancel(&id).unwrap_err();
        assert!(matches!(err, CancelError::Panicked { request_id } if request_id == id));

        // the registry lock is not poisoned by the panic
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn clones_share_entries() {
        let registry = TransactionRegistry::new();
        let other = registry.clone();
        let id = RequestId::random();
        other
            .register(id, Arc::new(CountingHandle::default()))
            .unwrap();

        assert!(registry.snapshot().contains(&id));
    }

    #[test]
    fn concurrent_writers_and_snapshots() {
        let registry = TransactionRegistry::new();
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let id = RequestId::random();
                        registry
                            .register(id, Arc::new(CountingHandle::default()))
                            .unwrap();
                        let _ = registry.snapshot();
                        registry.remove(&id);
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
