//! EC2-backed worker enumeration and liveness probing

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ec2::Client;
use tracing::debug;

use crate::aws::context::AwsContext;
use crate::interfaces::{WorkerHandle, WorkerLister, WorkerStatusProbe};

/// EC2 state code for a running instance
const RUNNING_STATE_CODE: &str = "16";

/// EC2 client scoped to the run's fixed instance set.
pub struct Ec2WorkerClient {
    client: Client,
    instance_ids: Vec<String>,
}

impl Ec2WorkerClient {
    /// Create a client from a pre-loaded AWS context over `instance_ids`.
    pub fn from_context(ctx: &AwsContext, instance_ids: Vec<String>) -> Self {
        Self {
            client: ctx.ec2_client(),
            instance_ids,
        }
    }
}

#[async_trait]
impl WorkerStatusProbe for Ec2WorkerClient {
    async fn is_running(&self, instance_id: &str) -> anyhow::Result<bool> {
        let output = self
            .client
            .describe_instance_status()
            .instance_ids(instance_id)
            .filters(
                Filter::builder()
                    .name("instance-state-code")
                    .values(RUNNING_STATE_CODE)
                    .build(),
            )
            .send()
            .await
            .with_context(|| format!("failed to describe status of {instance_id}"))?;

        let running = !output.instance_statuses().is_empty();
        debug!(instance_id = %instance_id, running, "Probed instance status");
        Ok(running)
    }
}

#[async_trait]
impl WorkerLister for Ec2WorkerClient {
    async fn list_workers(&self) -> anyhow::Result<Vec<WorkerHandle>> {
        let output = self
            .client
            .describe_instances()
            .set_instance_ids(Some(self.instance_ids.clone()))
            .send()
            .await
            .context("failed to describe run instances")?;

        let mut workers = Vec::with_capacity(self.instance_ids.len());
        for reservation in output.reservations() {
            for instance in reservation.instances() {
                let Some(instance_id) = instance.instance_id() else {
                    continue;
                };
                let instance_type = instance
                    .instance_type()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default();
                workers.push(WorkerHandle::new(instance_id, instance_type));
            }
        }
        anyhow::ensure!(
            workers.len() == self.instance_ids.len(),
            "expected {} instances, found {}",
            self.instance_ids.len(),
            workers.len()
        );
        Ok(workers)
    }
}
