//! Collaborator interfaces consumed by the collection pipeline
//!
//! The pipeline never talks to AWS directly; it goes through these traits so
//! the concurrency and merge logic can be exercised against in-memory fakes.
//! The AWS-backed implementations live in [`crate::aws`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One provisioned worker, as known to the provisioning layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    /// EC2 instance id
    pub instance_id: String,
    /// Instance type label (e.g. "m4.large")
    pub instance_type: String,
}

impl WorkerHandle {
    pub fn new(instance_id: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            instance_type: instance_type.into(),
        }
    }
}

/// Error from an artifact fetch, distinguishing absence from backend failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("object not found: {key}")]
    NotFound { key: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Key-addressed blob storage for run artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Check whether an object exists at `key`.
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Fetch the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError>;

    /// Write `bytes` to `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()>;
}

/// Reports whether a worker's instance is still executing.
#[async_trait]
pub trait WorkerStatusProbe: Send + Sync {
    async fn is_running(&self, instance_id: &str) -> anyhow::Result<bool>;
}

/// Enumerates the fixed worker set of the run.
#[async_trait]
pub trait WorkerLister: Send + Sync {
    async fn list_workers(&self) -> anyhow::Result<Vec<WorkerHandle>>;
}

/// One time series returned by the telemetry backend.
///
/// The label is a space-joined string of namespace, instance id, instance
/// type, and metric name; consumers match rows by the instance-id-shaped
/// token rather than by query order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub label: String,
    pub values: Vec<f64>,
}

/// Time range covered by a metric query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Time-series telemetry source for worker utilization data.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Query `metric_names` for every worker over `window`, one series per
    /// worker per metric.
    async fn query(
        &self,
        workers: &[WorkerHandle],
        metric_names: &[&str],
        window: MetricWindow,
    ) -> anyhow::Result<Vec<MetricSeries>>;
}
