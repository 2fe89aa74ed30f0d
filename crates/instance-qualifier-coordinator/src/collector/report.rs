//! Rendering the aggregated result set as the final qualification table

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, Table};
use instance_qualifier_common::defaults::{CPU_METRIC, MEM_METRIC};
use instance_qualifier_common::{InstanceRecord, Metric, TestStatus};

use crate::config::RunContext;
use crate::error::CollectError;
use crate::interfaces::WorkerHandle;

pub const TABLE_HEADER: [&str; 8] = [
    "INSTANCE TYPE",
    "STATUS",
    "CPU_USAGE_ACTIVE",
    "CPU_THRESHOLD",
    "MEM_USED_PERCENT",
    "MEM_THRESHOLD",
    "ALL TESTS PASS?",
    "TOTAL EXECUTION TIME (sec)",
];

const NOT_APPLICABLE: &str = "N/A";
const STATUS_SUCCESS: &str = "SUCCESS";
const STATUS_FAIL: &str = "FAIL";

/// Render one row per instance in `set`, plus an N/A row for every worker
/// that never produced a result.
///
/// Pure function of its inputs: no I/O, no clock, safe to call repeatedly.
pub fn render(
    set: &[InstanceRecord],
    workers: &[WorkerHandle],
) -> Result<Vec<Vec<String>>, CollectError> {
    let mut rows = Vec::with_capacity(workers.len().max(set.len()));
    for record in set {
        rows.push(record_row(record)?);
    }
    for worker in workers {
        if !set.iter().any(|r| r.instance_id == worker.instance_id) {
            rows.push(not_applicable_row(&worker.instance_type));
        }
    }
    Ok(rows)
}

fn record_row(record: &InstanceRecord) -> Result<Vec<String>, CollectError> {
    let mut cpu: Option<&Metric> = None;
    let mut mem: Option<&Metric> = None;
    let mut total_secs = 0.0_f64;
    let mut within_thresholds = true;
    let mut all_tests_pass = true;

    for result in &record.results {
        if result.status == TestStatus::Fail {
            all_tests_pass = false;
        }
        total_secs += result.execution_secs()?;
        for metric in &result.metrics {
            // Last-seen wins; after reconciliation every result carries the
            // same run-wide observation anyway
            match metric.name.as_str() {
                CPU_METRIC => cpu = Some(metric),
                MEM_METRIC => mem = Some(metric),
                _ => {}
            }
            if metric.breaches_threshold() {
                within_thresholds = false;
            }
        }
    }

    let success = within_thresholds && !record.is_timeout;
    if record.is_timeout {
        all_tests_pass = false;
    }

    let (cpu_value, cpu_threshold) = metric_cells(cpu);
    let (mem_value, mem_threshold) = metric_cells(mem);
    Ok(vec![
        record.instance_type.clone(),
        if success { STATUS_SUCCESS } else { STATUS_FAIL }.to_string(),
        cpu_value,
        cpu_threshold,
        mem_value,
        mem_threshold,
        all_tests_pass.to_string(),
        format!("{total_secs:.2}"),
    ])
}

fn metric_cells(metric: Option<&Metric>) -> (String, String) {
    match metric {
        Some(m) => (format!("{:.2}", m.value), format!("{:.2}", m.threshold)),
        None => (format!("{:.2}", 0.0), format!("{:.2}", 0.0)),
    }
}

fn not_applicable_row(instance_type: &str) -> Vec<String> {
    let mut row = vec![instance_type.to_string()];
    row.extend(vec![NOT_APPLICABLE.to_string(); 7]);
    row
}

/// Print the qualification table and the remote artifact location.
pub fn print_report(rows: &[Vec<String>], ctx: &RunContext) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(
        TABLE_HEADER
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    for row in rows {
        table.add_row(row.clone());
    }
    println!("{table}");
    println!();
    println!("Detailed test results can be found in {}", ctx.remote_root_uri());
}
