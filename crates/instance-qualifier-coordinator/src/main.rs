//! instance-qualifier: collect and report instance qualification results
//!
//! Polls result artifacts from benchmarked EC2 instances, aggregates them
//! into a run-wide result set, reconciles the set with CloudWatch
//! utilization data, and prints the per-instance-type verdict table.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;

use instance_qualifier_common::defaults::{self, DEFAULT_TIMEOUT};
use instance_qualifier_coordinator::aws::{
    AwsContext, CloudWatchMetrics, Ec2WorkerClient, S3ArtifactStore,
};
use instance_qualifier_coordinator::collector;
use instance_qualifier_coordinator::config::RunContext;
use instance_qualifier_coordinator::interfaces::WorkerLister;

#[derive(Parser, Debug)]
#[command(name = "instance-qualifier")]
#[command(about = "Result collection and reporting for EC2 instance qualification runs")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for all instances to finish, then aggregate and report
    Collect(RunArgs),

    /// Re-report a finished run from its remote aggregated artifact
    Resume(RunArgs),
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// S3 bucket holding run artifacts
    #[arg(long)]
    bucket: String,

    /// Run identifier; names the remote prefix and the final artifact
    #[arg(long)]
    run_id: String,

    /// Comma-separated EC2 instance ids of the run's workers
    #[arg(long)]
    instance_ids: String,

    /// AWS region
    #[arg(long, default_value = "us-east-2")]
    region: String,

    /// Local directory for result artifacts
    #[arg(long, default_value = "results")]
    results_dir: String,

    /// Max seconds for test-suite execution on instances
    #[arg(long, default_value_t = DEFAULT_TIMEOUT)]
    timeout: u64,

    /// When the suite started, RFC 3339; anchors the metric query window
    #[arg(long)]
    start_time: Option<DateTime<Utc>>,

    /// Max CPU utilization percent before an instance is disqualified
    #[arg(long, default_value_t = 100.0)]
    cpu_threshold: f64,

    /// Max memory utilization percent before an instance is disqualified
    #[arg(long, default_value_t = 100.0)]
    mem_threshold: f64,
}

impl RunArgs {
    fn instance_ids(&self) -> Vec<String> {
        self.instance_ids
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Build the run context. A live collection anchors the metric window at
    /// now; a resume without an explicit start falls back to the window
    /// ending now.
    fn run_context(&self, resuming: bool) -> RunContext {
        let start_time = self.start_time.unwrap_or_else(|| {
            if resuming {
                Utc::now() - TimeDelta::seconds(self.timeout as i64)
            } else {
                Utc::now()
            }
        });
        RunContext::new(
            &self.bucket,
            format!("qualifier-run-{}", self.run_id),
            &self.results_dir,
            defaults::final_result_filename(&self.run_id),
            self.timeout,
            start_time,
            self.cpu_threshold,
            self.mem_threshold,
        )
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Collect(run_args) => {
            let ctx = run_args.run_context(false);
            let aws = AwsContext::new(&run_args.region).await;
            let store = Arc::new(S3ArtifactStore::from_context(&aws, ctx.bucket.clone()));
            let ec2 = Arc::new(Ec2WorkerClient::from_context(&aws, run_args.instance_ids()));
            let metrics = Arc::new(CloudWatchMetrics::from_context(&aws));

            let workers = ec2.list_workers().await?;
            info!(
                run_id = %run_args.run_id,
                workers = workers.len(),
                region = %run_args.region,
                "Starting result collection"
            );
            collector::collect_and_report(store, ec2, metrics, &workers, &ctx).await?;
        }

        Command::Resume(run_args) => {
            let ctx = run_args.run_context(true);
            let aws = AwsContext::new(&run_args.region).await;
            let store = Arc::new(S3ArtifactStore::from_context(&aws, ctx.bucket.clone()));
            let ec2 = Ec2WorkerClient::from_context(&aws, run_args.instance_ids());
            let metrics = Arc::new(CloudWatchMetrics::from_context(&aws));

            let workers = ec2.list_workers().await?;
            info!(
                run_id = %run_args.run_id,
                workers = workers.len(),
                "Resuming report from remote artifact"
            );
            collector::resume_and_report(store, metrics, &workers, &ctx).await?;
        }
    }

    Ok(())
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    }
}
