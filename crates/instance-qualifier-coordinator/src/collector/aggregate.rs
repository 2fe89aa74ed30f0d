//! Merging individual instance results into the aggregated set
//!
//! Only the coordinator's single aggregation task calls into this type, so
//! read-modify-write on the aggregated artifact needs no further locking.

use std::sync::Arc;

use instance_qualifier_common::record::{decode_result_set, encode_result_set};
use instance_qualifier_common::InstanceRecord;
use tracing::{info, warn};

use crate::config::RunContext;
use crate::error::CollectError;
use crate::interfaces::ArtifactStore;

/// Merges one instance's raw result artifact into the aggregated set and
/// persists the set locally and remotely.
pub struct ResultAggregator<S> {
    store: Arc<S>,
    ctx: RunContext,
}

impl<S: ArtifactStore> ResultAggregator<S> {
    pub fn new(store: Arc<S>, ctx: RunContext) -> Self {
        Self { store, ctx }
    }

    /// Decode `raw`, append it to the aggregated set, and persist.
    ///
    /// The local copy is written before the remote upload, so an upload
    /// failure still leaves the merge applied locally.
    pub async fn merge_and_persist(&self, raw: &[u8]) -> Result<(), CollectError> {
        let record: InstanceRecord = serde_json::from_slice(raw)?;

        let local_path = self.ctx.local_final_path();
        let mut set = decode_result_set(&std::fs::read(&local_path)?)?;

        // A result for an instance already in the set means a duplicate
        // completion (poller raced the fallback); keep the first.
        if set.iter().any(|r| r.instance_id == record.instance_id) {
            warn!(
                instance_id = %record.instance_id,
                "Duplicate result for instance, keeping first"
            );
            return Ok(());
        }

        info!(
            instance_id = %record.instance_id,
            instance_type = %record.instance_type,
            "Merging instance result into aggregated set"
        );
        set.push(record);

        let encoded = encode_result_set(&set)?;
        std::fs::write(&local_path, &encoded)?;

        let remote_key = self.ctx.remote_final_key();
        self.store
            .put(&remote_key, encoded)
            .await
            .map_err(|source| CollectError::Upload {
                key: remote_key,
                source,
            })
    }
}
