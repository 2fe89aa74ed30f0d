//! instance-qualifier-common - Shared result artifact types
//!
//! This crate provides the wire types shared between the remote agent and the
//! coordinator, without any AWS SDK dependencies to keep it lightweight.
//!
//! The JSON field names are part of the persisted artifact format: the agent
//! running on each instance uploads one `InstanceRecord` per instance, and the
//! coordinator merges them into the run-wide aggregated result set.
//!
//! ## Modules
//!
//! - [`defaults`]: Shared constants (metric names, artifact naming)
//! - [`metric`]: One metric reading (value/threshold/unit)
//! - [`record`]: Per-instance result record
//! - [`test_result`]: Result of one test file execution

pub mod defaults;
pub mod metric;
pub mod record;
pub mod test_result;

// Re-export commonly used types
pub use metric::Metric;
pub use record::InstanceRecord;
pub use test_result::{ExecutionTimeError, TestResult, TestStatus};
