//! ReaperLoop - reaper を一定間隔で起動する scheduler
//!
//! # 方針
//! - 1 本の専用タスクで動かす（tick は重ならない）
//! - 前の tick が長引いて取りこぼした tick は捨てる（MissedTickBehavior::Skip）
//! - 各 tick は別タスクで実行し、panic してもループは止まらない
//! - shutdown は新しい tick を止めるだけで、実行中の tick は最後まで走らせる

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::app::reaper::CancellationReaper;
use crate::domain::ReaperError;

/// ReaperLoop handle
/// - `shutdown_tx` を drop してもループは止まる
/// - `shutdown_and_join()` で実行中の tick の終了まで待てる
pub struct ReaperLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReaperLoop {
    /// config の interval で起動
    pub fn spawn(reaper: Arc<CancellationReaper>) -> Self {
        let interval = reaper.config().interval();
        Self::spawn_with_interval(reaper, interval)
    }

    pub fn spawn_with_interval(reaper: Arc<CancellationReaper>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(reaper_loop(reaper, interval, shutdown_rx));
        tracing::info!(interval_secs = interval.as_secs(), "reaper loop started");
        Self { shutdown_tx, join }
    }

    /// 新しい tick の起動を止める
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// shutdown を要求し、ループ（と実行中の tick）の終了を待つ
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "reaper loop terminated abnormally");
        }
    }
}

async fn reaper_loop(
    reaper: Arc<CancellationReaper>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                // sender dropped: nobody can stop us later, so stop now
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let tick = tokio::spawn({
            let reaper = Arc::clone(&reaper);
            async move { reaper.run().await }
        });
        if let Err(e) = tick.await {
            reaper.metrics().record_failure();
            let err = ReaperError::Panicked(e.to_string());
            tracing::error!(error = %err, "reaper tick did not complete");
        }
    }

    tracing::info!("reaper loop stopped");
}
