//! AWS client modules for the coordinator
//!
//! Wrappers around AWS SDK clients implementing the collaborator traits in
//! [`crate::interfaces`]:
//! - EC2: worker enumeration and liveness probing
//! - S3: result artifact storage
//! - CloudWatch: utilization telemetry

pub mod cloudwatch;
pub mod context;
pub mod ec2;
pub mod s3;

pub use cloudwatch::CloudWatchMetrics;
pub use context::AwsContext;
pub use ec2::Ec2WorkerClient;
pub use s3::S3ArtifactStore;
