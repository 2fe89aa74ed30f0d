//! Run-wide configuration for the collection pipeline
//!
//! `RunContext` is created once before polling begins and passed by
//! reference into every pipeline call; nothing in the pipeline mutates it
//! and there is no ambient global configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use instance_qualifier_common::defaults::{CPU_METRIC, MEM_METRIC};

use crate::interfaces::{MetricWindow, WorkerHandle};

/// Immutable run-wide configuration consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// S3 bucket holding all run artifacts
    pub bucket: String,
    /// Key prefix under which this run's artifacts live
    pub bucket_root_dir: String,
    /// Local directory for the aggregated result set and scratch artifacts
    pub results_dir: PathBuf,
    /// Filename of the aggregated result artifact, local and remote
    pub final_result_filename: String,
    /// Max seconds for test-suite execution on instances
    pub timeout_secs: u64,
    /// When the suite started executing; anchors the metric query window
    pub start_time: DateTime<Utc>,
    /// Metric name to threshold mapping for pass/fail judgement
    pub thresholds: BTreeMap<String, f64>,
}

impl RunContext {
    /// Build a context with the two tracked metrics thresholded.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bucket: impl Into<String>,
        bucket_root_dir: impl Into<String>,
        results_dir: impl Into<PathBuf>,
        final_result_filename: impl Into<String>,
        timeout_secs: u64,
        start_time: DateTime<Utc>,
        cpu_threshold: f64,
        mem_threshold: f64,
    ) -> Self {
        let thresholds = BTreeMap::from([
            (CPU_METRIC.to_string(), cpu_threshold),
            (MEM_METRIC.to_string(), mem_threshold),
        ]);
        Self {
            bucket: bucket.into(),
            bucket_root_dir: bucket_root_dir.into(),
            results_dir: results_dir.into(),
            final_result_filename: final_result_filename.into(),
            timeout_secs,
            start_time,
            thresholds,
        }
    }

    /// Local path of the aggregated result artifact.
    pub fn local_final_path(&self) -> PathBuf {
        self.results_dir.join(&self.final_result_filename)
    }

    /// Remote key of the aggregated result artifact.
    pub fn remote_final_key(&self) -> String {
        format!("{}/{}", self.bucket_root_dir, self.final_result_filename)
    }

    /// Remote key where a worker's agent uploads its complete result.
    pub fn worker_primary_key(&self, worker: &WorkerHandle) -> String {
        format!(
            "{}/{}/{}/{}",
            self.bucket_root_dir,
            worker.instance_type,
            worker.instance_id,
            instance_qualifier_common::defaults::result_filename(&worker.instance_id),
        )
    }

    /// Remote key where partial results accumulate during execution.
    ///
    /// Fetched when the instance stops running without having produced the
    /// primary artifact (crash mid-suite, or the remote timeout fired first).
    pub fn worker_fallback_key(&self, worker: &WorkerHandle) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.bucket_root_dir,
            worker.instance_type,
            worker.instance_id,
            instance_qualifier_common::defaults::BUCKET_TESTS_DIR,
            instance_qualifier_common::defaults::result_filename(&worker.instance_id),
        )
    }

    /// Local scratch path for a worker's raw result artifact.
    pub fn local_worker_path(&self, worker: &WorkerHandle) -> PathBuf {
        self.results_dir
            .join(instance_qualifier_common::defaults::result_filename(
                &worker.instance_id,
            ))
    }

    /// The `[start, start+timeout]` window metric queries cover.
    pub fn metric_window(&self) -> MetricWindow {
        MetricWindow {
            start: self.start_time,
            end: self.start_time + TimeDelta::seconds(self.timeout_secs as i64),
        }
    }

    /// Threshold configured for `metric_name`, 0.0 if untracked.
    pub fn threshold_for(&self, metric_name: &str) -> f64 {
        self.thresholds.get(metric_name).copied().unwrap_or_default()
    }

    /// Human-readable remote location for the report footer.
    pub fn remote_root_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.bucket_root_dir)
    }
}

/// Convenience for tests and local tooling: a context rooted at `dir`.
pub fn context_for_dir(dir: &Path, run_id: &str) -> RunContext {
    RunContext::new(
        "instance-qualifier-test",
        format!("qualifier-run-{run_id}"),
        dir,
        instance_qualifier_common::defaults::final_result_filename(run_id),
        instance_qualifier_common::defaults::DEFAULT_TIMEOUT,
        Utc::now(),
        100.0,
        100.0,
    )
}
