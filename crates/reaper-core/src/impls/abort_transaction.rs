//! AbortTransaction - tokio task を transaction として扱う handle
//!
//! # 仕組み
//! - 書き込みは `TransactionContext::commit()` を通す。commit は gate（Mutex）を
//!   握ったまま cancel 済みかを確認し、そのまま書き込みを実行する
//! - `cancel()` も同じ gate を握ってフラグを立てるので、実行中の commit が
//!   終わるまで待つ。`cancel()` が返った後に始まる commit はすべて拒否される
//! - フラグを立てた後で task の `AbortHandle::abort()` を呼ぶ（次の `.await` で止まる）
//! - 2 回目以降の `cancel()` は何もしない（冪等）
//!
//! `spawn_tracked` は実行側のヘルパーで、作業開始前に registry へ登録し、
//! 作業が終わったら（完了・エラー・abort いずれでも）登録を外します。

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::task::{AbortHandle, JoinHandle};

use crate::domain::{CancelError, RegistryError, RequestId};
use crate::ports::TransactionHandle;
use crate::registry::TransactionRegistry;

/// cancel フラグと commit の排他を兼ねる gate（true = cancel 済み）
type Gate = Arc<Mutex<bool>>;

fn lock(gate: &Gate) -> MutexGuard<'_, bool> {
    // commit 中の panic で poison されても、フラグ自体は壊れていない
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 作業側から見た transaction の状態
#[derive(Debug, Clone)]
pub struct TransactionContext {
    request_id: RequestId,
    gate: Gate,
}

/// cancel 済みの transaction が書き込もうとした
#[derive(Debug, thiserror::Error)]
#[error("transaction {0} was cancelled")]
pub struct TransactionCancelled(pub RequestId);

impl TransactionContext {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.gate)
    }

    /// 重い処理の前に早めに抜けるための確認
    ///
    /// 書き込みとは結びついていないので、状態変更には `commit()` を使うこと。
    pub fn ensure_active(&self) -> Result<(), TransactionCancelled> {
        if self.is_cancelled() {
            return Err(TransactionCancelled(self.request_id));
        }
        Ok(())
    }

    /// cancel されていなければ `write` を実行する
    ///
    /// `write` の実行中は `cancel()` がブロックされる。`write` は同期処理で短く保ち、
    /// 中から同じ transaction を cancel してはいけない（デッドロックする）。
    pub fn commit<R>(&self, write: impl FnOnce() -> R) -> Result<R, TransactionCancelled> {
        let cancelled = lock(&self.gate);
        if *cancelled {
            return Err(TransactionCancelled(self.request_id));
        }
        let out = write();
        drop(cancelled);
        Ok(out)
    }
}

/// tokio task を止める TransactionHandle
#[derive(Debug)]
pub struct AbortTransaction {
    request_id: RequestId,
    gate: Gate,
    abort: OnceLock<AbortHandle>,
}

impl AbortTransaction {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            gate: Arc::new(Mutex::new(false)),
            abort: OnceLock::new(),
        }
    }

    pub fn context(&self) -> TransactionContext {
        TransactionContext {
            request_id: self.request_id,
            gate: Arc::clone(&self.gate),
        }
    }

    /// task の AbortHandle を結びつける
    ///
    /// attach 前に cancel されていた場合はここで abort する。
    pub fn attach(&self, abort: AbortHandle) {
        if self.abort.set(abort).is_err() {
            return;
        }
        if self.is_cancelled()
            && let Some(abort) = self.abort.get()
        {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.gate)
    }
}

impl TransactionHandle for AbortTransaction {
    fn cancel(&self) -> Result<(), CancelError> {
        {
            // in-flight な commit が終わるまでここで待つ
            let mut cancelled = lock(&self.gate);
            if *cancelled {
                return Ok(());
            }
            *cancelled = true;
        }
        match self.abort.get() {
            Some(abort) if abort.is_finished() => {
                tracing::debug!(request_id = %self.request_id, "transaction already finished");
            }
            Some(abort) => {
                abort.abort();
                tracing::info!(request_id = %self.request_id, "transaction aborted");
            }
            // attach() will see the flag
            None => {}
        }
        Ok(())
    }
}

/// drop 時に自分の登録だけを外す
struct Deregister {
    registry: TransactionRegistry,
    request_id: RequestId,
    handle: Arc<dyn TransactionHandle>,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.registry.remove_if_same(&self.request_id, &self.handle);
    }
}

/// `work` を tokio task として起動し、その間 registry に登録しておく
///
/// # フロー
/// 1. AbortTransaction を作って registry に登録（作業開始前）
/// 2. task を spawn、AbortHandle を handle に結びつける
/// 3. task の future が drop されたら登録を外す
///
/// tokio runtime の中から呼ぶこと。
pub fn spawn_tracked<F, Fut>(
    registry: &TransactionRegistry,
    request_id: RequestId,
    work: F,
) -> Result<JoinHandle<Fut::Output>, RegistryError>
where
    F: FnOnce(TransactionContext) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let handle = Arc::new(AbortTransaction::new(request_id));
    let dyn_handle: Arc<dyn TransactionHandle> = handle.clone();
    registry.register(request_id, Arc::clone(&dyn_handle))?;

    let guard = Deregister {
        registry: registry.clone(),
        request_id,
        handle: dyn_handle,
    };
    let fut = work(handle.context());
    let join = tokio::spawn(async move {
        let _guard = guard;
        fut.await
    });
    handle.attach(join.abort_handle());
    Ok(join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn completed_work_deregisters() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();

        let join = spawn_tracked(&registry, id, |_ctx| async { 42 }).unwrap();
        assert_eq!(join.await.unwrap(), 42);
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn cancel_aborts_and_deregisters() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let (started_tx, started_rx) = oneshot::channel();

        let join = spawn_tracked(&registry, id, |_ctx| async move {
            let _ = started_tx.send(());
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();
        started_rx.await.unwrap();
        assert!(registry.get(&id).is_some());

        registry.cancel(&id).unwrap();

        let err = join.await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(registry.get(&id).is_none());
    }

    #[tokio::test]
    async fn cancel_twice_is_a_noop() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let join = spawn_tracked(&registry, id, |_ctx| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();
        let handle = registry.get(&id).unwrap();

        handle.cancel().unwrap();
        handle.cancel().unwrap();
        assert!(join.await.unwrap_err().is_cancelled());

        // stale handle after deregistration
        handle.cancel().unwrap();
    }

    #[tokio::test]
    async fn cancel_after_completion_is_absorbed() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let join = spawn_tracked(&registry, id, |_ctx| async {}).unwrap();
        let handle = registry.get(&id);
        join.await.unwrap();

        if let Some(handle) = handle {
            handle.cancel().unwrap();
        }
        assert_eq!(registry.cancel(&id).unwrap(), crate::registry::CancelOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn duplicate_request_id_is_rejected_and_first_kept() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let first = spawn_tracked(&registry, id, |_ctx| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .unwrap();

        let second = spawn_tracked(&registry, id, |_ctx| async {});
        assert!(matches!(second, Err(RegistryError::AlreadyRegistered(_))));
        assert!(registry.get(&id).is_some());

        first.abort();
        let _ = first.await;
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn cancel_before_attach_is_remembered() {
        let tx = AbortTransaction::new(RequestId::random());
        let ctx = tx.context();
        tx.cancel().unwrap();

        assert!(tx.is_cancelled());
        assert!(ctx.is_cancelled());
        assert!(ctx.ensure_active().is_err());
    }

    #[tokio::test]
    async fn context_reports_cancellation_to_the_work() {
        let tx = AbortTransaction::new(RequestId::random());
        let ctx = tx.context();
        assert!(ctx.ensure_active().is_ok());

        tx.cancel().unwrap();
        let err = ctx.ensure_active().unwrap_err();
        assert_eq!(err.0, ctx.request_id());
    }

    #[test]
    fn commit_after_cancel_is_refused_without_running_the_write() {
        let tx = AbortTransaction::new(RequestId::random());
        let ctx = tx.context();
        assert_eq!(ctx.commit(|| 1).unwrap(), 1);

        tx.cancel().unwrap();
        let mut ran = false;
        assert!(ctx.commit(|| ran = true).is_err());
        assert!(!ran);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_waits_for_an_in_flight_commit() {
        let registry = TransactionRegistry::new();
        let id = RequestId::random();
        let committed = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let work_committed = Arc::clone(&committed);
        let join = spawn_tracked(&registry, id, move |ctx| async move {
            ctx.commit(|| {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
                work_committed.store(true, Ordering::SeqCst);
            })
        })
        .unwrap();
        entered_rx.await.unwrap();

        let handle = registry.get(&id).unwrap();
        let seen = Arc::clone(&committed);
        let cancel = tokio::task::spawn_blocking(move || {
            handle.cancel().unwrap();
            seen.load(Ordering::SeqCst)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cancel.is_finished(), "cancel() returned during a commit");
        release_tx.send(()).unwrap();

        let committed_when_cancel_returned = cancel.await.unwrap();
        assert!(committed_when_cancel_returned);
        let _ = join.await;
        assert!(registry.get(&id).is_none());
    }
}
