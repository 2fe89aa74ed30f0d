//! Per-worker result polling and the fan-in coordinator
//!
//! One poll task per worker fetches that worker's result artifact; all
//! completions funnel through a single bounded channel into one aggregation
//! task, so the shared aggregated result artifact only ever has one writer.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::collector::aggregate::ResultAggregator;
use crate::config::RunContext;
use crate::error::CollectError;
use crate::interfaces::{ArtifactStore, FetchError, WorkerHandle, WorkerStatusProbe};

/// Interval between primary-artifact fetch attempts
pub const POLLING_PERIOD: Duration = Duration::from_secs(5);

/// Poll for one worker's result artifact until it appears or the worker is
/// observed not-running.
///
/// Intentionally unbounded: the run-wide deadline is enforced above this
/// layer. The remote agent marks the timeout flag and uploads whatever
/// partial artifact exists when its own deadline fires, at which point the
/// instance stops, the liveness probe reports not-running, and the fallback
/// fetch picks up that partial artifact.
pub async fn poll_for_result<S, P>(
    store: &S,
    probe: &P,
    worker: &WorkerHandle,
    primary_key: &str,
    fallback_key: &str,
) -> Result<Vec<u8>, CollectError>
where
    S: ArtifactStore + ?Sized,
    P: WorkerStatusProbe + ?Sized,
{
    let mut ticker = tokio::time::interval(POLLING_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(instance_id = %worker.instance_id, key = %primary_key, "Polling for instance result");
    loop {
        ticker.tick().await;

        match store.get(primary_key).await {
            Ok(bytes) => {
                info!(instance_id = %worker.instance_id, "Polling for instance result succeeded");
                return Ok(bytes);
            }
            Err(FetchError::NotFound { .. }) => {}
            Err(FetchError::Other(e)) => {
                debug!(instance_id = %worker.instance_id, error = %e, "Result fetch attempt failed");
            }
        }

        // A probe error aborts this poller; it is not retried.
        let running = probe
            .is_running(&worker.instance_id)
            .await
            .map_err(|source| CollectError::LivenessCheck {
                instance_id: worker.instance_id.clone(),
                source,
            })?;

        if !running {
            // Worker exited without producing the primary artifact; take the
            // partial results uploaded during execution instead.
            let bytes = store.get(fallback_key).await.map_err(|e| match e {
                FetchError::NotFound { key } => CollectError::TransientFetch { key },
                FetchError::Other(source) => CollectError::Store {
                    key: fallback_key.to_string(),
                    source,
                },
            })?;
            info!(
                instance_id = %worker.instance_id,
                key = %fallback_key,
                "Instance stopped before uploading its result, downloaded partial result"
            );
            return Ok(bytes);
        }
    }
}

/// Poll for all workers' results in parallel and merge them as they arrive.
///
/// Per-worker poll errors and per-item merge errors are logged and leave
/// that worker absent from the set; only the final authoritative download of
/// the remote artifact is fatal, and even then the local copy is retained.
pub async fn poll_for_results<S, P>(
    store: Arc<S>,
    probe: Arc<P>,
    workers: &[WorkerHandle],
    ctx: &RunContext,
) -> anyhow::Result<()>
where
    S: ArtifactStore + 'static,
    P: WorkerStatusProbe + 'static,
{
    use anyhow::Context;

    // Seed local and remote artifacts with an empty set before any poller
    // can complete.
    std::fs::create_dir_all(&ctx.results_dir)
        .with_context(|| format!("failed to create {}", ctx.results_dir.display()))?;
    std::fs::write(ctx.local_final_path(), b"[]")
        .with_context(|| format!("failed to seed {}", ctx.local_final_path().display()))?;
    store
        .put(&ctx.remote_final_key(), b"[]".to_vec())
        .await
        .context("failed to seed remote result set")?;

    // Capacity = worker count, so no poller blocks waiting to enqueue.
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(workers.len().max(1));

    // Single aggregation task: drains completions strictly in arrival order,
    // serializing all writes to the shared artifact.
    let aggregator = ResultAggregator::new(store.clone(), ctx.clone());
    let agg_store = store.clone();
    let agg_ctx = ctx.clone();
    let aggregation = tokio::spawn(async move {
        while let Some(raw) = rx.recv().await {
            if let Err(e) = aggregator.merge_and_persist(&raw).await {
                // Failing to merge one instance result must not terminate
                // the whole run.
                warn!(error = %e, "Failed to merge instance result");
            }
        }

        // All pollers are done: re-download the remote artifact as the
        // authoritative copy, covering any divergence from a failed
        // per-merge upload.
        let remote_key = agg_ctx.remote_final_key();
        match agg_store.get(&remote_key).await {
            Ok(bytes) => {
                std::fs::write(agg_ctx.local_final_path(), bytes)?;
                Ok(())
            }
            Err(FetchError::NotFound { key }) => Err(CollectError::TransientFetch { key }),
            Err(FetchError::Other(source)) => Err(CollectError::Store {
                key: remote_key,
                source,
            }),
        }
    });

    let mut handles = Vec::with_capacity(workers.len());
    for worker in workers {
        let store = store.clone();
        let probe = probe.clone();
        let tx = tx.clone();
        let worker = worker.clone();
        let primary_key = ctx.worker_primary_key(&worker);
        let fallback_key = ctx.worker_fallback_key(&worker);
        let scratch_path = ctx.local_worker_path(&worker);

        handles.push(tokio::spawn(async move {
            match poll_for_result(
                store.as_ref(),
                probe.as_ref(),
                &worker,
                &primary_key,
                &fallback_key,
            )
            .await
            {
                Ok(bytes) => {
                    // Scratch copy for post-run debugging; removed after a
                    // successful hand-off, and failing to remove it is
                    // acceptable.
                    if let Err(e) = std::fs::write(&scratch_path, &bytes) {
                        debug!(path = %scratch_path.display(), error = %e, "Failed to write scratch artifact");
                    }
                    if tx.send(bytes).await.is_err() {
                        warn!(instance_id = %worker.instance_id, "Aggregation channel closed early");
                        return;
                    }
                    if let Err(e) = std::fs::remove_file(&scratch_path) {
                        debug!(path = %scratch_path.display(), error = %e, "Failed to remove scratch artifact");
                    }
                }
                Err(e) => {
                    // Failing to poll one instance must not terminate the
                    // whole run; the worker is simply absent from the set.
                    warn!(instance_id = %worker.instance_id, error = %e, "Failed to poll for instance result");
                }
            }
        }));
    }
    drop(tx);

    for joined in join_all(handles).await {
        if let Err(e) = joined {
            warn!(error = %e, "Poll task panicked");
        }
    }

    aggregation
        .await
        .context("aggregation task panicked")?
        .context("final download of the aggregated result set failed; local copy retained")
}
