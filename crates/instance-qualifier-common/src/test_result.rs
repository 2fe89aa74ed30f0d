//! Result of running one test file on one instance

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metric::Metric;

/// Pass/fail status of one test file execution.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TestStatus {
    Pass,
    Fail,
}

/// Error parsing the agent-reported execution time.
#[derive(Debug, Error)]
#[error("invalid execution time {value:?}: {source}")]
pub struct ExecutionTimeError {
    pub value: String,
    #[source]
    pub source: std::num::ParseFloatError,
}

/// Result of a single test file, as reported by the agent.
///
/// `execution_time` is carried as the agent's decimal string and parsed only
/// when the report is rendered, so a malformed value surfaces as a render
/// error rather than a decode error during aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    /// Test file name
    pub label: String,
    /// Pass/fail status
    pub status: TestStatus,
    /// Execution duration in decimal seconds
    #[serde(rename = "execution-time")]
    pub execution_time: String,
    /// Metric readings; replaced wholesale by metrics reconciliation
    #[serde(rename = "Metrics", default)]
    pub metrics: Vec<Metric>,
}

impl TestResult {
    /// Parse the execution time into seconds.
    pub fn execution_secs(&self) -> Result<f64, ExecutionTimeError> {
        self.execution_time
            .parse()
            .map_err(|source| ExecutionTimeError {
                value: self.execution_time.clone(),
                source,
            })
    }
}
