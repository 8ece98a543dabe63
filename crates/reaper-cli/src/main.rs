use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use reaper_core::domain::{QueryStatus, RequestId};
use reaper_core::impls::{InMemoryQueryStore, spawn_tracked};
use reaper_core::observability::{LogFormat, init_logging};
use reaper_core::ports::{Clock, SystemClock};
use reaper_core::{ReaperBuilder, ReaperConfig, ReaperLoop, TransactionRegistry};

/// Runs the cancellation reaper against an in-memory workload.
#[derive(Debug, Parser)]
#[command(name = "reaper")]
#[command(about = "Cancels async query transactions that ran too long or were cancelled")]
#[command(version)]
struct Args {
    /// Queries older than this (seconds) are reaped.
    #[arg(long, env = "REAPER_MAX_RUN_TIME_SECS", default_value_t = ReaperConfig::DEFAULT_MAX_RUN_TIME_SECS)]
    max_run_time_secs: u64,

    /// How often the reaper runs (seconds).
    #[arg(long, env = "REAPER_INTERVAL_SECS", default_value_t = ReaperConfig::DEFAULT_INTERVAL_SECS)]
    interval_secs: u64,

    /// Log output format (`json` or `pretty`).
    #[arg(long, env = "REAPER_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    /// Number of demo queries to submit.
    #[arg(long, default_value_t = 6)]
    queries: usize,

    /// Stop after this many seconds (0 = until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    run_for_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let config = ReaperConfig::new(args.max_run_time_secs, args.interval_secs)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryQueryStore::new(Arc::clone(&clock)));
    let registry = TransactionRegistry::new();

    let reaper = Arc::new(
        ReaperBuilder::new()
            .config(config)
            .registry(registry.clone())
            .store(store.clone())
            .clock(clock)
            .build()?,
    );

    tracing::info!(
        max_run_time_secs = config.max_run_time_secs(),
        interval_secs = config.interval().as_secs(),
        queries = args.queries,
        "starting reaper"
    );

    // (A) workload: query i runs for i * max_run_time / 2 seconds,
    //     every third query is cancelled by its user right away
    for i in 0..args.queries {
        let record = store.submit(RequestId::random());
        store.transition(record.id, QueryStatus::Processing)?;

        let query_id = record.id;
        let run_for = Duration::from_secs(config.max_run_time_secs() * i as u64 / 2);
        let query_store = store.clone();
        spawn_tracked(&registry, record.request_id, move |ctx| async move {
            tokio::time::sleep(run_for).await;
            // the write runs under the commit gate, so it cannot land after a cancel
            match ctx.commit(|| query_store.transition(query_id, QueryStatus::Complete)) {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(query_id = %query_id, error = %e, "could not complete query");
                }
                Err(e) => tracing::debug!(error = %e, "completion dropped"),
            }
        })?;

        if i % 3 == 2 {
            store.cancel(query_id)?;
        }
    }

    // (B) reaper loop
    let reaper_loop = ReaperLoop::spawn(reaper.clone());

    if args.run_for_secs > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.run_for_secs)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    // (C) stop scheduling, let an in-flight tick finish
    reaper_loop.shutdown_and_join().await;

    println!("{}", serde_json::to_string_pretty(&reaper.metrics().snapshot())?);
    println!("still registered: {}", registry.len());
    Ok(())
}
