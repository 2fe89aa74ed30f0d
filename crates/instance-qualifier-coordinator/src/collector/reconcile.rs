//! Reconciling the aggregated result set with utilization telemetry
//!
//! Agents self-report utilization unreliably (a hung suite uploads nothing),
//! so after polling finishes the coordinator overwrites every record's metric
//! lists with what the telemetry backend observed over the run window.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use instance_qualifier_common::defaults::{
    CPU_METRIC, INSTANCE_ID_PATTERN, MEM_METRIC, METRIC_UNIT,
};
use instance_qualifier_common::record::{decode_result_set, encode_result_set};
use instance_qualifier_common::{InstanceRecord, Metric};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::RunContext;
use crate::error::CollectError;
use crate::interfaces::{ArtifactStore, MetricSeries, MetricsBackend, WorkerHandle};

const QUERY_RETRY_DELAY: Duration = Duration::from_secs(2);
const QUERY_RETRY_ATTEMPTS: usize = 3;

static INSTANCE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(INSTANCE_ID_PATTERN).expect("instance id pattern is valid"));

/// Overwrites the aggregated set's metric data with backend observations.
pub struct MetricsReconciler<S, M> {
    store: Arc<S>,
    backend: Arc<M>,
    ctx: RunContext,
}

impl<S, M> MetricsReconciler<S, M>
where
    S: ArtifactStore,
    M: MetricsBackend,
{
    pub fn new(store: Arc<S>, backend: Arc<M>, ctx: RunContext) -> Self {
        Self {
            store,
            backend,
            ctx,
        }
    }

    /// Query utilization for every worker over the run window and fold the
    /// observations into the aggregated set.
    ///
    /// Returns the updated set. Persisting it locally and remotely is
    /// attempted but non-fatal; the returned set is authoritative for the
    /// report either way.
    pub async fn reconcile(
        &self,
        workers: &[WorkerHandle],
    ) -> Result<Vec<InstanceRecord>, CollectError> {
        let window = self.ctx.metric_window();
        let series = (|| async {
            self.backend
                .query(workers, &[CPU_METRIC, MEM_METRIC], window)
                .await
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(QUERY_RETRY_DELAY)
                .with_max_times(QUERY_RETRY_ATTEMPTS),
        )
        .notify(|err, delay| {
            warn!(error = %err, retry_in = ?delay, "Metrics query failed, retrying");
        })
        .await
        .map_err(CollectError::Query)?;

        let observed = index_by_instance(&series, &self.ctx)?;

        let local_path = self.ctx.local_final_path();
        let mut set = decode_result_set(&std::fs::read(&local_path)?)?;

        for record in &mut set {
            let Some(metrics) = observed.get(record.instance_id.as_str()) else {
                debug!(instance_id = %record.instance_id, "No utilization data for instance");
                continue;
            };
            // Every test result of the record carries the same run-wide
            // observation; self-reported values are discarded.
            for result in &mut record.results {
                result.metrics = metrics.clone();
            }
        }
        info!(
            instances = set.len(),
            series = series.len(),
            "Reconciled aggregated set with utilization data"
        );

        match encode_result_set(&set) {
            Ok(encoded) => {
                if let Err(e) = std::fs::write(&local_path, &encoded) {
                    warn!(path = %local_path.display(), error = %e, "Failed to persist reconciled set locally");
                }
                if let Err(e) = self.store.put(&self.ctx.remote_final_key(), encoded).await {
                    warn!(key = %self.ctx.remote_final_key(), error = %e, "Failed to upload reconciled set");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode reconciled set"),
        }

        Ok(set)
    }
}

/// Group observed series into per-instance metric lists.
///
/// Series are matched to instances by the instance-id-shaped token in the
/// label; a non-empty series whose label carries no such token means the
/// backend's labelling scheme changed and the whole pass fails.
fn index_by_instance<'a>(
    series: &'a [MetricSeries],
    ctx: &RunContext,
) -> Result<HashMap<&'a str, Vec<Metric>>, CollectError> {
    let mut observed: HashMap<&str, Vec<Metric>> = HashMap::new();
    for s in series {
        // An instance that never started its agent produces an empty series
        if s.values.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = s.label.split_whitespace().collect();
        let instance_id = tokens
            .iter()
            .find(|t| INSTANCE_ID_RE.is_match(t))
            .ok_or_else(|| CollectError::SchemaMismatch {
                label: s.label.clone(),
            })?;
        let Some(metric_name) = tokens.last() else {
            continue;
        };
        let Some(peak) = s.values.iter().copied().reduce(f64::max) else {
            continue;
        };
        observed.entry(instance_id).or_default().push(Metric {
            name: (*metric_name).to_string(),
            value: peak,
            threshold: ctx.threshold_for(metric_name),
            unit: METRIC_UNIT.to_string(),
        });
    }
    Ok(observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::testing::{MemoryMetrics, MemoryStore};
    use crate::config::context_for_dir;
    use instance_qualifier_common::{TestResult, TestStatus};

    const ID_A: &str = "i-0123456789abcdef0";
    const ID_B: &str = "i-0123456789abcdef1";

    fn record(instance_id: &str, instance_type: &str) -> InstanceRecord {
        InstanceRecord {
            instance_id: instance_id.to_string(),
            instance_type: instance_type.to_string(),
            vcpus: "2".to_string(),
            memory: "8192".to_string(),
            os: "Linux/UNIX".to_string(),
            architecture: "x86_64".to_string(),
            is_timeout: false,
            results: vec![
                TestResult {
                    label: "cpu-test.sh".to_string(),
                    status: TestStatus::Pass,
                    execution_time: "10.5".to_string(),
                    metrics: vec![],
                },
                TestResult {
                    label: "mem-test.sh".to_string(),
                    status: TestStatus::Pass,
                    execution_time: "3.2".to_string(),
                    metrics: vec![],
                },
            ],
        }
    }

    fn seed(ctx: &RunContext, set: &[InstanceRecord]) {
        std::fs::write(ctx.local_final_path(), encode_result_set(set).unwrap()).unwrap();
    }

    fn series(label: &str, values: &[f64]) -> MetricSeries {
        MetricSeries {
            label: label.to_string(),
            values: values.to_vec(),
        }
    }

    fn workers() -> Vec<WorkerHandle> {
        vec![
            WorkerHandle::new(ID_A, "m4.large"),
            WorkerHandle::new(ID_B, "m4.xlarge"),
        ]
    }

    #[tokio::test]
    async fn overwrites_metrics_on_matching_records_only() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for_dir(dir.path(), "rec");
        seed(&ctx, &[record(ID_A, "m4.large"), record(ID_B, "m4.xlarge")]);

        let backend = Arc::new(MemoryMetrics::with_series(vec![
            series(&format!("CWAgent {ID_A} m4.large cpu_usage_active"), &[12.0, 48.5, 30.1]),
            series(&format!("CWAgent {ID_A} m4.large mem_used_percent"), &[22.5]),
        ]));
        let store = Arc::new(MemoryStore::default());
        let set = MetricsReconciler::new(store.clone(), backend, ctx.clone())
            .reconcile(&workers())
            .await
            .unwrap();

        let a = set.iter().find(|r| r.instance_id == ID_A).unwrap();
        for result in &a.results {
            assert_eq!(result.metrics.len(), 2);
            let cpu = result.metrics.iter().find(|m| m.name == CPU_METRIC).unwrap();
            // Peak over the window, not the first sample
            assert_eq!(cpu.value, 48.5);
            assert_eq!(cpu.threshold, 100.0);
            assert_eq!(cpu.unit, "Percent");
        }

        // No data for ID_B: its (empty) metric lists are left alone
        let b = set.iter().find(|r| r.instance_id == ID_B).unwrap();
        assert!(b.results.iter().all(|r| r.metrics.is_empty()));

        // Reconciled set was persisted remotely as well
        let remote = decode_result_set(&store.blob(&ctx.remote_final_key()).unwrap()).unwrap();
        assert_eq!(remote, set);
    }

    #[tokio::test]
    async fn empty_series_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for_dir(dir.path(), "emp");
        seed(&ctx, &[record(ID_A, "m4.large")]);

        let backend = Arc::new(MemoryMetrics::with_series(vec![
            series("CWAgent unlabelled cpu_usage_active", &[]),
            series(&format!("CWAgent {ID_A} m4.large cpu_usage_active"), &[5.0]),
        ]));
        let set = MetricsReconciler::new(Arc::new(MemoryStore::default()), backend, ctx)
            .reconcile(&workers())
            .await
            .unwrap();

        assert_eq!(set[0].results[0].metrics.len(), 1);
    }

    #[tokio::test]
    async fn label_without_instance_id_fails_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for_dir(dir.path(), "lbl");
        seed(&ctx, &[record(ID_A, "m4.large")]);

        let backend = Arc::new(MemoryMetrics::with_series(vec![series(
            "CWAgent m4.large cpu_usage_active",
            &[5.0],
        )]));
        let err = MetricsReconciler::new(Arc::new(MemoryStore::default()), backend, ctx)
            .reconcile(&workers())
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::SchemaMismatch { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn query_is_retried_before_failing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for_dir(dir.path(), "rty");
        seed(&ctx, &[record(ID_A, "m4.large")]);

        let backend = Arc::new(MemoryMetrics::failing_first(
            vec![series(&format!("CWAgent {ID_A} m4.large cpu_usage_active"), &[5.0])],
            2,
        ));
        let set = MetricsReconciler::new(Arc::new(MemoryStore::default()), backend.clone(), ctx)
            .reconcile(&workers())
            .await
            .unwrap();
        assert_eq!(backend.call_count(), 3);
        assert_eq!(set[0].results[0].metrics.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_is_fatal_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_for_dir(dir.path(), "ftl");
        seed(&ctx, &[record(ID_A, "m4.large")]);

        let backend = Arc::new(MemoryMetrics::failing_first(vec![], 10));
        let err = MetricsReconciler::new(Arc::new(MemoryStore::default()), backend.clone(), ctx)
            .reconcile(&workers())
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Query(_)));
        // Initial attempt plus the bounded retries
        assert_eq!(backend.call_count(), 1 + QUERY_RETRY_ATTEMPTS);
    }
}
