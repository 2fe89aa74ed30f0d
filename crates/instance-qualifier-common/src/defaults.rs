//! Shared constants for the result-collection pipeline
//!
//! These values are part of the contract with the remote agent and the
//! CloudWatch agent configuration; they must stay in sync with what the
//! instances upload.

/// CloudWatch agent metric name for CPU utilization
pub const CPU_METRIC: &str = "cpu_usage_active";

/// CloudWatch agent metric name for memory utilization
pub const MEM_METRIC: &str = "mem_used_percent";

/// Unit attached to reconciled metric readings
pub const METRIC_UNIT: &str = "Percent";

/// Filename suffix of per-instance result artifacts
pub const RESULT_FILE_SUFFIX: &str = "-test-results.json";

/// Bucket sub-directory where agents continuously upload partial results
pub const BUCKET_TESTS_DIR: &str = "Tests";

/// Filename prefix of the run-wide aggregated result artifact
pub const FINAL_RESULT_PREFIX: &str = "final-results-";

/// Pattern matching an EC2 instance id token inside a metric label
pub const INSTANCE_ID_PATTERN: &str = "i-[0-9a-z]{17}";

/// Default max seconds for test-suite execution on instances
pub const DEFAULT_TIMEOUT: u64 = 3600;

/// Build the per-instance result artifact filename for an instance id.
pub fn result_filename(instance_id: &str) -> String {
    format!("{instance_id}{RESULT_FILE_SUFFIX}")
}

/// Build the aggregated result filename for a run id.
pub fn final_result_filename(run_id: &str) -> String {
    format!("{FINAL_RESULT_PREFIX}{run_id}.json")
}
