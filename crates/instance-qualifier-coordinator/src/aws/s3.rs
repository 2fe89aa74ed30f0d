//! S3-backed artifact storage

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::aws::context::AwsContext;
use crate::interfaces::{ArtifactStore, FetchError};

/// S3 client scoped to the run's artifact bucket.
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
}

impl S3ArtifactStore {
    /// Create a store from a pre-loaded AWS context.
    pub fn from_context(ctx: &AwsContext, bucket: impl Into<String>) -> Self {
        Self {
            client: ctx.s3_client(),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::Error::new(service_err)
                        .context(format!("failed to check existence of s3://{}/{key}", self.bucket)))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        debug!(bucket = %self.bucket, key = %key, "Fetching object");
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let data = output.body.collect().await.map_err(|e| {
                    FetchError::Other(
                        anyhow::Error::new(e)
                            .context(format!("failed to read body of s3://{}/{key}", self.bucket)),
                    )
                })?;
                Ok(data.into_bytes().to_vec())
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Err(FetchError::NotFound {
                        key: key.to_string(),
                    })
                } else {
                    Err(FetchError::Other(anyhow::Error::new(service_err).context(
                        format!("failed to fetch s3://{}/{key}", self.bucket),
                    )))
                }
            }
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        debug!(bucket = %self.bucket, key = %key, size = bytes.len(), "Uploading object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("failed to upload s3://{}/{key}", self.bucket))?;
        Ok(())
    }
}
