//! Status - reaper のカウンタ
//!
//! tick ごとの結果（TickReport）をロックなしの atomic カウンタに積み上げ、
//! `snapshot()` で ReaperCounts として取り出します。

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::app::reaper::TickReport;
use crate::observability::ReaperCounts;

#[derive(Debug)]
pub struct ReaperMetrics {
    ticks: AtomicU64,
    successful_ticks: AtomicU64,
    failed_ticks: AtomicU64,
    candidates: AtomicU64,
    cancellations_requested: AtomicU64,
    already_gone: AtomicU64,
    skipped: AtomicU64,
    cancel_failures: AtomicU64,
    /// i64::MIN = まだ成功していない
    last_success_at: AtomicI64,
}

impl ReaperMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            successful_ticks: AtomicU64::new(0),
            failed_ticks: AtomicU64::new(0),
            candidates: AtomicU64::new(0),
            cancellations_requested: AtomicU64::new(0),
            already_gone: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            cancel_failures: AtomicU64::new(0),
            last_success_at: AtomicI64::new(i64::MIN),
        }
    }

    /// store の参照まで成功した tick を記録
    pub fn record_tick(&self, report: &TickReport, at_unix_secs: i64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.successful_ticks.fetch_add(1, Ordering::Relaxed);
        self.candidates
            .fetch_add(report.candidates as u64, Ordering::Relaxed);
        self.cancellations_requested
            .fetch_add(report.cancelled as u64, Ordering::Relaxed);
        self.already_gone
            .fetch_add(report.already_gone as u64, Ordering::Relaxed);
        self.skipped.fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.cancel_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.last_success_at.store(at_unix_secs, Ordering::Release);
    }

    /// 途中で中断した tick を記録
    pub fn record_failure(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.failed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReaperCounts {
        let last = self.last_success_at.load(Ordering::Acquire);
        ReaperCounts {
            ticks: self.ticks.load(Ordering::Relaxed),
            successful_ticks: self.successful_ticks.load(Ordering::Relaxed),
            failed_ticks: self.failed_ticks.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            cancellations_requested: self.cancellations_requested.load(Ordering::Relaxed),
            already_gone: self.already_gone.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            cancel_failures: self.cancel_failures.load(Ordering::Relaxed),
            last_success_at: (last != i64::MIN).then_some(last),
        }
    }
}

impl Default for ReaperMetrics {
    fn default() -> Self {
        Self::new()
    }
}
