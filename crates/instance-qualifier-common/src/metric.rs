//! One metric reading attached to a test result

use serde::{Deserialize, Serialize};

/// A single named metric reading with the threshold it is judged against.
///
/// Before metrics reconciliation these may be absent or self-reported by the
/// agent; reconciliation replaces them wholesale with CloudWatch data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    /// Metric name (e.g. "cpu_usage_active")
    #[serde(rename = "metric")]
    pub name: String,
    /// Observed value
    pub value: f64,
    /// Threshold the value is compared against; meeting or exceeding it fails
    /// the instance
    pub threshold: f64,
    /// Unit of the observed value
    pub unit: String,
}

impl Metric {
    /// True if this reading meets or exceeds its threshold.
    pub fn breaches_threshold(&self) -> bool {
        self.value >= self.threshold
    }
}
