//! CancellationReaper - 古い / cancel 済みの query の transaction を止める
//!
//! # フロー（1 tick）
//! 1. cutoff = now - max_run_time
//! 2. QueryStore::find_active({CANCELLED, PROCESSING, QUEUED}, cutoff)
//! 3. TransactionRegistry::snapshot()（tick の最初に 1 回だけ）
//! 4. store 側の request_id と snapshot の積集合を候補とする
//! 5. 候補ごとに判定し、対象なら live registry をキーで引いて cancel
//!
//! # 判定
//! - status == CANCELLED なら経過時間に関係なく cancel
//! - PROCESSING / QUEUED は `|now - updated_on|`（秒、切り捨て）が
//!   max_run_time_secs を **超えた** ときだけ cancel（ちょうどは対象外）
//!
//! reaper 自身は registry から登録を外しません。登録解除は実行側の責務です。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;

use crate::app::config::ReaperConfig;
use crate::app::status::ReaperMetrics;
use crate::domain::{QueryRecord, QueryStatus, ReaperError, RequestId, StoreError};
use crate::ports::{Clock, QueryStore};
use crate::registry::{CancelOutcome, TransactionRegistry};

const CUTOFF_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// 1 tick の結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// store が返したレコード数
    pub scanned: usize,
    /// snapshot 時点の registry のエントリ数
    pub registered: usize,
    /// 積集合の大きさ
    pub candidates: usize,
    /// cancel を要求できた数
    pub cancelled: usize,
    /// snapshot 後に registry から消えていた数
    pub already_gone: usize,
    /// 候補だが判定で対象外だった数
    pub skipped: usize,
    /// cancel が失敗した数
    pub failed: usize,
}

/// Does `record` warrant cancelling its transaction at `now`?
pub fn should_cancel(record: &QueryRecord, now: DateTime<Utc>, max_run_time_secs: u64) -> bool {
    match record.status {
        QueryStatus::Cancelled => true,
        QueryStatus::Processing | QueryStatus::Queued => {
            record.elapsed_secs(now) > max_run_time_secs
        }
        QueryStatus::Complete | QueryStatus::Failed => false,
    }
}

pub struct CancellationReaper {
    config: ReaperConfig,
    registry: TransactionRegistry,
    store: Arc<dyn QueryStore>,
    clock: Arc<dyn Clock>,
    metrics: Arc<ReaperMetrics>,
}

impl CancellationReaper {
    pub fn new(
        config: ReaperConfig,
        registry: TransactionRegistry,
        store: Arc<dyn QueryStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<ReaperMetrics>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            clock,
            metrics,
        }
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<ReaperMetrics> {
        &self.metrics
    }

    /// scheduler から呼ぶ入口
    ///
    /// 何も返さず、何も伝播しません。失敗はログとカウンタにだけ残り、
    /// 次の tick が自然なリトライになります。
    pub async fn run(&self) {
        let span = tracing::info_span!(
            "reaper_tick",
            max_run_time_secs = self.config.max_run_time_secs()
        );
        async {
            match self.run_tick().await {
                Ok(report) => {
                    self.metrics
                        .record_tick(&report, self.clock.now().timestamp());
                    if report.cancelled > 0 || report.failed > 0 {
                        tracing::info!(
                            candidates = report.candidates,
                            cancelled = report.cancelled,
                            failed = report.failed,
                            "reaper tick completed"
                        );
                    } else {
                        tracing::debug!(
                            scanned = report.scanned,
                            registered = report.registered,
                            candidates = report.candidates,
                            "reaper tick completed"
                        );
                    }
                }
                Err(e) => {
                    self.metrics.record_failure();
                    tracing::error!(error = %e, kind = ?e.kind(), "reaper tick aborted");
                }
            }
        }
        .instrument(span)
        .await
    }

    /// 1 tick 分の処理
    ///
    /// store の参照に失敗した場合だけ Err を返します（registry には触れない）。
    /// 個々の cancel 失敗は TickReport に数えるだけで処理は続行します。
    pub async fn run_tick(&self) -> Result<TickReport, ReaperError> {
        let now = self.clock.now();
        let max_secs = self.config.max_run_time_secs();
        let cutoff = now
            .checked_sub_signed(self.config.max_run_time())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        tracing::debug!(cutoff = %cutoff.format(CUTOFF_FORMAT), "evaluated cutoff");

        let records = self
            .store
            .find_active(&QueryStatus::REAPABLE, cutoff)
            .await?;
        validate(&records)?;

        let snapshot = self.registry.snapshot();
        let mut report = TickReport {
            scanned: records.len(),
            registered: snapshot.len(),
            ..TickReport::default()
        };
        if snapshot.is_empty() {
            return Ok(report);
        }

        // request_id -> cancel 対象か（同じ request_id が複数あればどれか 1 つで十分）
        let mut candidates: BTreeMap<RequestId, bool> = BTreeMap::new();
        for record in records.iter().filter(|r| snapshot.contains(&r.request_id)) {
            *candidates.entry(record.request_id).or_insert(false) |=
                should_cancel(record, now, max_secs);
        }
        report.candidates = candidates.len();

        for (request_id, due) in candidates {
            if !due {
                report.skipped += 1;
                continue;
            }
            match self.registry.cancel(&request_id) {
                Ok(CancelOutcome::Requested) => {
                    report.cancelled += 1;
                    tracing::info!(request_id = %request_id, "cancellation requested");
                }
                Ok(CancelOutcome::AlreadyGone) => {
                    report.already_gone += 1;
                    tracing::debug!(request_id = %request_id, "transaction already gone");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(request_id = %request_id, error = %e, "cancellation failed");
                }
            }
        }
        Ok(report)
    }
}

fn validate(records: &[QueryRecord]) -> Result<(), StoreError> {
    match records.iter().find(|r| r.updated_on < r.created_on) {
        Some(bad) => Err(StoreError::Malformed {
            query_id: bad.id,
            reason: "updated_on precedes created_on".to_string(),
        }),
        None => Ok(()),
    }
}
