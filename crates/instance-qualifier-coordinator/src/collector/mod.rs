//! The result-collection pipeline
//!
//! Stages run in order: [`poll`] gathers every worker's result artifact and
//! merges arrivals through [`aggregate`], [`reconcile`] folds in utilization
//! telemetry, and [`report`] renders the per-instance-type verdict table.

pub mod aggregate;
pub mod poll;
pub mod reconcile;
pub mod report;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub use aggregate::ResultAggregator;
pub use poll::{poll_for_result, poll_for_results, POLLING_PERIOD};
pub use reconcile::MetricsReconciler;
pub use report::{print_report, render, TABLE_HEADER};

use crate::config::RunContext;
use crate::interfaces::{ArtifactStore, MetricsBackend, WorkerHandle, WorkerStatusProbe};

/// Full pipeline for a live run: poll, reconcile, report.
pub async fn collect_and_report<S, P, M>(
    store: Arc<S>,
    probe: Arc<P>,
    backend: Arc<M>,
    workers: &[WorkerHandle],
    ctx: &RunContext,
) -> anyhow::Result<()>
where
    S: ArtifactStore + 'static,
    P: WorkerStatusProbe + 'static,
    M: MetricsBackend,
{
    info!(workers = workers.len(), "Collecting instance results");
    poll_for_results(store.clone(), probe, workers, ctx).await?;

    let set = MetricsReconciler::new(store, backend, ctx.clone())
        .reconcile(workers)
        .await
        .context("failed to reconcile results with utilization data")?;

    let rows = render(&set, workers)?;
    print_report(&rows, ctx);
    Ok(())
}

/// Report on a finished run without re-polling: re-download the aggregated
/// artifact, reconcile, and render.
pub async fn resume_and_report<S, M>(
    store: Arc<S>,
    backend: Arc<M>,
    workers: &[WorkerHandle],
    ctx: &RunContext,
) -> anyhow::Result<()>
where
    S: ArtifactStore + 'static,
    M: MetricsBackend,
{
    std::fs::create_dir_all(&ctx.results_dir)
        .with_context(|| format!("failed to create {}", ctx.results_dir.display()))?;
    let remote_key = ctx.remote_final_key();
    let bytes = store
        .get(&remote_key)
        .await
        .with_context(|| format!("failed to download aggregated result set {remote_key}"))?;
    std::fs::write(ctx.local_final_path(), bytes)
        .with_context(|| format!("failed to write {}", ctx.local_final_path().display()))?;

    let set = MetricsReconciler::new(store, backend, ctx.clone())
        .reconcile(workers)
        .await
        .context("failed to reconcile results with utilization data")?;

    let rows = render(&set, workers)?;
    print_report(&rows, ctx);
    Ok(())
}
