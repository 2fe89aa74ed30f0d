//! Typed errors for the result-collection pipeline
//!
//! Per-worker failures (poll, merge) are isolated by the coordinator and
//! never abort the run; reconciliation failures and the final authoritative
//! download are surfaced to the caller as fatal.

use thiserror::Error;

/// Errors produced by the collection pipeline.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Artifact not yet present at its key. Expected during polling; drives
    /// the retry loop.
    #[error("artifact not yet available: {key}")]
    TransientFetch { key: String },

    /// Artifact store operation failed for a reason other than absence.
    #[error("artifact store failure for {key}")]
    Store {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Liveness probe unreachable. Fatal to the affected poller only.
    #[error("liveness check failed for {instance_id}")]
    LivenessCheck {
        instance_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Malformed result artifact. Fatal to the merge call that hit it.
    #[error("malformed result artifact")]
    Decode(#[from] serde_json::Error),

    /// Telemetry backend failure after retries. Fatal to the whole
    /// reconciliation pass.
    #[error("metrics query failed")]
    Query(#[source] anyhow::Error),

    /// Metric label with no instance-id-shaped token; indicates a schema
    /// mismatch with the telemetry backend.
    #[error("no instance id in metric label {label:?}")]
    SchemaMismatch { label: String },

    /// Remote write failed. Logged by callers; local state is retained.
    #[error("failed to upload {key}")]
    Upload {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Agent reported an unparsable execution time.
    #[error(transparent)]
    ExecutionTime(#[from] instance_qualifier_common::ExecutionTimeError),

    /// Local artifact I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CollectError {
    /// True for errors that only mean "keep polling".
    pub fn is_transient(&self) -> bool {
        matches!(self, CollectError::TransientFetch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_fetch_is_transient() {
        let err = CollectError::TransientFetch {
            key: "run/i-abc/results.json".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn upload_error_is_not_transient() {
        let err = CollectError::Upload {
            key: "run/final.json".to_string(),
            source: anyhow::anyhow!("connection reset"),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("run/final.json"));
    }
}
