//! Periodic background dispatch.

use crate::server::telemetry::{
    increment_batches_dispatched, increment_dispatch_failures, increment_dispatch_runs,
    record_dispatch_duration,
};
use core::time::Duration;
use ferroq_core::{
    Result,
    invoke::Invoker,
    queue::{DispatchReport, Dispatcher},
    store::Store,
};
use std::time::Instant;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Runs one dispatch pass and records its metrics.
pub async fn run_dispatch<S: Store, I: Invoker>(
    dispatcher: &Dispatcher<S, I>,
) -> Result<DispatchReport> {
    let start = Instant::now();
    let report = dispatcher.dispatch().await?;

    increment_dispatch_runs();
    increment_batches_dispatched(report.batches_dispatched as u64);
    increment_dispatch_failures(report.failures.len() as u64);
    record_dispatch_duration(start.elapsed().as_secs_f64() * 1_000.0);
    Ok(report)
}

/// Triggers a dispatch every `period` until `shutdown_token` is cancelled.
///
/// Runs never overlap within one scheduler: a slow run delays the next tick
/// instead of stacking up. A failed run is logged and the loop carries on.
pub async fn dispatch_loop<S: Store, I: Invoker>(
    dispatcher: Dispatcher<S, I>,
    period: Duration,
    shutdown_token: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(?period, "dispatch scheduler started");

    loop {
        tokio::select! {
            biased;
            () = shutdown_token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = run_dispatch(&dispatcher).await {
                    tracing::error!(error = %e, "scheduled dispatch failed");
                }
            }
        }
    }

    tracing::info!("dispatch scheduler stopped");
}
