//! CloudWatch-backed utilization telemetry
//!
//! Workers run the CloudWatch agent, which publishes utilization under the
//! `CWAgent` namespace dimensioned by instance id and type. One query per
//! worker per metric covers the whole run window in a single period, so the
//! `Maximum` statistic directly yields the peak utilization of the run.

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, Metric as CwMetric, MetricDataQuery, MetricStat};
use aws_sdk_cloudwatch::Client;
use instance_qualifier_common::defaults::CPU_METRIC;
use tracing::debug;

use crate::aws::context::AwsContext;
use crate::interfaces::{MetricSeries, MetricWindow, MetricsBackend, WorkerHandle};

const NAMESPACE: &str = "CWAgent";
const STATISTIC: &str = "Maximum";

/// CloudWatch client implementing the telemetry backend.
pub struct CloudWatchMetrics {
    client: Client,
}

impl CloudWatchMetrics {
    /// Create a client from a pre-loaded AWS context.
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudwatch_client(),
        }
    }
}

fn build_query(
    idx: usize,
    worker: &WorkerHandle,
    metric_name: &str,
    period_secs: i32,
) -> MetricDataQuery {
    let mut metric = CwMetric::builder()
        .namespace(NAMESPACE)
        .metric_name(metric_name)
        .dimensions(
            Dimension::builder()
                .name("InstanceId")
                .value(&worker.instance_id)
                .build(),
        )
        .dimensions(
            Dimension::builder()
                .name("InstanceType")
                .value(&worker.instance_type)
                .build(),
        );
    // The agent publishes CPU utilization per core plus an aggregate series
    if metric_name == CPU_METRIC {
        metric = metric.dimensions(Dimension::builder().name("cpu").value("cpu-total").build());
    }

    MetricDataQuery::builder()
        .id(format!("q{idx}_{metric_name}"))
        .metric_stat(
            MetricStat::builder()
                .metric(metric.build())
                .period(period_secs)
                .stat(STATISTIC)
                .build(),
        )
        .build()
}

#[async_trait]
impl MetricsBackend for CloudWatchMetrics {
    async fn query(
        &self,
        workers: &[WorkerHandle],
        metric_names: &[&str],
        window: MetricWindow,
    ) -> anyhow::Result<Vec<MetricSeries>> {
        let period_secs = i32::try_from((window.end - window.start).num_seconds())
            .context("metric window too large")?;

        let mut queries = Vec::with_capacity(workers.len() * metric_names.len());
        for (idx, worker) in workers.iter().enumerate() {
            for metric_name in metric_names {
                queries.push(build_query(idx, worker, metric_name, period_secs));
            }
        }

        let mut series = Vec::with_capacity(queries.len());
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .get_metric_data()
                .set_metric_data_queries(Some(queries.clone()))
                .start_time(DateTime::from_secs(window.start.timestamp()))
                .end_time(DateTime::from_secs(window.end.timestamp()))
                .set_next_token(next_token.take())
                .send()
                .await
                .context("failed to query metric data")?;

            for result in output.metric_data_results() {
                series.push(MetricSeries {
                    label: result.label().unwrap_or_default().to_string(),
                    values: result.values().to_vec(),
                });
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        debug!(
            queries = queries.len(),
            series = series.len(),
            "Fetched utilization series"
        );
        Ok(series)
    }
}
