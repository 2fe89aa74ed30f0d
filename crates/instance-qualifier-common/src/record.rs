//! Per-instance result record
//!
//! The canonical shape of both the per-instance raw artifact uploaded by the
//! agent and the entries of the run-wide aggregated result set. Field names
//! follow the artifact format and must not change without a matching agent
//! update.

use serde::{Deserialize, Serialize};

use crate::test_result::TestResult;

/// The complete result record for one benchmarked instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceRecord {
    /// EC2 instance id, stable for the run
    #[serde(rename = "instance-id")]
    pub instance_id: String,
    /// Instance type (e.g. "m4.large")
    #[serde(rename = "instance-type")]
    pub instance_type: String,
    /// vCPU count, as reported by the agent
    #[serde(rename = "vCPUs", default)]
    pub vcpus: String,
    /// Memory size, as reported by the agent
    #[serde(default)]
    pub memory: String,
    /// OS label
    #[serde(rename = "OS", default)]
    pub os: String,
    /// Architecture label
    #[serde(rename = "Architecture", default)]
    pub architecture: String,
    /// True if the run-wide deadline elapsed before the instance finished
    #[serde(rename = "isTimeout", default)]
    pub is_timeout: bool,
    /// One entry per executed test file, in execution order
    #[serde(default)]
    pub results: Vec<TestResult>,
}

/// Decode the aggregated result set from its persisted JSON form.
pub fn decode_result_set(bytes: &[u8]) -> Result<Vec<InstanceRecord>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Encode the aggregated result set to its persisted JSON form (indented).
pub fn encode_result_set(records: &[InstanceRecord]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use crate::test_result::TestStatus;
    use proptest::prelude::*;

    fn sample_record(id: &str) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_string(),
            instance_type: "m4.large".to_string(),
            vcpus: "2".to_string(),
            memory: "8192".to_string(),
            os: "Linux/UNIX".to_string(),
            architecture: "x86_64".to_string(),
            is_timeout: false,
            results: vec![TestResult {
                label: "cpu-test.sh".to_string(),
                status: TestStatus::Pass,
                execution_time: "10.50".to_string(),
                metrics: vec![Metric {
                    name: "cpu_usage_active".to_string(),
                    value: 35.8,
                    threshold: 40.0,
                    unit: "Percent".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn wire_field_names_match_agent_format() {
        let json = serde_json::to_value(sample_record("i-0123456789abcdef0")).unwrap();
        let object = json.as_object().unwrap();
        for key in [
            "instance-id",
            "instance-type",
            "vCPUs",
            "memory",
            "OS",
            "Architecture",
            "isTimeout",
            "results",
        ] {
            assert!(object.contains_key(key), "missing field {key}");
        }
    }

    #[test]
    fn empty_set_round_trips() {
        let encoded = encode_result_set(&[]).unwrap();
        assert_eq!(decode_result_set(&encoded).unwrap(), Vec::new());
    }

    #[test]
    fn seed_artifact_decodes_as_empty_set() {
        // The coordinator seeds the artifact with a bare empty array
        assert_eq!(decode_result_set(b"[]").unwrap(), Vec::new());
    }

    fn arb_metric() -> impl Strategy<Value = Metric> {
        ("[a-z_]{1,20}", 0.0f64..100.0, 0.0f64..100.0).prop_map(|(name, value, threshold)| {
            Metric {
                name,
                value,
                threshold,
                unit: "Percent".to_string(),
            }
        })
    }

    fn arb_test_result() -> impl Strategy<Value = TestResult> {
        (
            "[a-z0-9-]{1,16}\\.sh",
            prop_oneof![Just(TestStatus::Pass), Just(TestStatus::Fail)],
            0u32..100_000,
            proptest::collection::vec(arb_metric(), 0..4),
        )
            .prop_map(|(label, status, centis, metrics)| TestResult {
                label,
                status,
                execution_time: format!("{:.2}", f64::from(centis) / 100.0),
                metrics,
            })
    }

    fn arb_record() -> impl Strategy<Value = InstanceRecord> {
        (
            "i-[0-9a-f]{17}",
            "[a-z][0-9][a-z]?\\.(large|xlarge)",
            any::<bool>(),
            proptest::collection::vec(arb_test_result(), 0..5),
        )
            .prop_map(|(instance_id, instance_type, is_timeout, results)| InstanceRecord {
                instance_id,
                instance_type,
                vcpus: "4".to_string(),
                memory: "16384".to_string(),
                os: "Linux/UNIX".to_string(),
                architecture: "x86_64".to_string(),
                is_timeout,
                results,
            })
    }

    proptest! {
        #[test]
        fn result_set_round_trips(records in proptest::collection::vec(arb_record(), 0..8)) {
            let encoded = encode_result_set(&records).unwrap();
            let decoded = decode_result_set(&encoded).unwrap();
            prop_assert_eq!(decoded, records);
        }
    }
}
