//! Slurm job intermediate representation.
//!
//! The IR is the canonical, kind-agnostic description of what Slurm must be
//! asked for on behalf of a pod and its co-placed siblings. It is built
//! once per scheduling cycle and never cached across cycles.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::errors::{BridgeError, Result};
use crate::quantity;
use crate::wellknown;

/// The workload kind at the root of a pod's controller-owner chain,
/// possibly overridden by a pod-group association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Pod,
    Job,
    JobSet,
    PodGroup,
    LeaderWorkerSet,
    Other,
}

/// Lightweight handle to the root workload object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootHandle {
    pub kind: RootKind,
    pub namespace: String,
    pub name: String,
}

/// Slurm job attributes for the placeholder submission. A `None` field
/// means "inherit the Slurm default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobInfo {
    pub account: Option<String>,
    pub constraints: Option<String>,
    pub cpu_per_task: Option<i32>,
    pub group_id: Option<String>,
    pub job_name: Option<String>,
    pub licenses: Option<String>,
    /// Memory per node, in MiB.
    pub mem_per_node: Option<i64>,
    pub min_nodes: Option<i32>,
    pub max_nodes: Option<i32>,
    pub partition: Option<String>,
    pub qos: Option<String>,
    pub reservation: Option<String>,
    pub tasks_per_node: Option<i32>,
    /// Time limit in minutes.
    pub time_limit: Option<i32>,
    pub user_id: Option<String>,
    pub wckey: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobIr {
    pub root: RootHandle,
    /// Pods that must be co-placed, never empty after translation.
    pub pods: Vec<Pod>,
    pub job_info: JobInfo,
}

/// Parse the stringified job id from the placeholder label. Any failure
/// yields 0, the "no job" sentinel.
pub fn parse_job_id(input: &str) -> i32 {
    input.parse::<u32>().map(|v| v as i32).unwrap_or(0)
}

/// The job-id label value of a pod, or the empty string.
pub fn pod_job_id_label(pod: &Pod) -> &str {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(wellknown::LABEL_PLACEHOLDER_JOB_ID))
        .map(String::as_str)
        .unwrap_or("")
}

/// The placeholder node annotation of a pod, or the empty string.
pub fn pod_node_annotation(pod: &Pod) -> &str {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(wellknown::ANNOTATION_PLACEHOLDER_NODE))
        .map(String::as_str)
        .unwrap_or("")
}

impl JobInfo {
    /// Merge job attribute annotations from the root object, overriding any
    /// derived values. Unparseable numeric annotations fail translation.
    pub fn apply_annotations(&mut self, annotations: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in annotations {
            match key.as_str() {
                wellknown::ANNOTATION_ACCOUNT => self.account = Some(value.clone()),
                wellknown::ANNOTATION_CONSTRAINTS => self.constraints = Some(value.clone()),
                wellknown::ANNOTATION_GROUP_ID => self.group_id = Some(value.clone()),
                wellknown::ANNOTATION_CPU_PER_TASK => {
                    let v = quantity::value(&Quantity(value.clone()))
                        .ok_or_else(|| invalid(key, value))?;
                    self.cpu_per_task = Some(v as i32);
                }
                wellknown::ANNOTATION_JOB_NAME => self.job_name = Some(value.clone()),
                wellknown::ANNOTATION_LICENSES => self.licenses = Some(value.clone()),
                wellknown::ANNOTATION_MAX_NODES => {
                    self.max_nodes = Some(parse_i32(key, value)?);
                }
                wellknown::ANNOTATION_MEM_PER_NODE => {
                    let v = quantity::mebibytes(&Quantity(value.clone()))
                        .ok_or_else(|| invalid(key, value))?;
                    self.mem_per_node = Some(v);
                }
                wellknown::ANNOTATION_MIN_NODES => {
                    self.min_nodes = Some(parse_i32(key, value)?);
                }
                wellknown::ANNOTATION_PARTITION => self.partition = Some(value.clone()),
                wellknown::ANNOTATION_QOS => self.qos = Some(value.clone()),
                wellknown::ANNOTATION_RESERVATION => self.reservation = Some(value.clone()),
                wellknown::ANNOTATION_TIME_LIMIT => {
                    self.time_limit = Some(parse_i32(key, value)?);
                }
                wellknown::ANNOTATION_USER_ID => self.user_id = Some(value.clone()),
                wellknown::ANNOTATION_WCKEY => self.wckey = Some(value.clone()),
                _ => {}
            }
        }
        Ok(())
    }

    /// Derive cpu-per-task and mem-per-node from the IR pod set: the max
    /// over all pods of max(requests, limits), overhead included. Zero
    /// stays unset so Slurm applies the partition defaults.
    pub fn apply_pod_resources(&mut self, pods: &[Pod]) {
        let mut cpu_max: i64 = 0;
        let mut mem_max: i64 = 0;
        for pod in pods {
            let (req_cpu, req_mem) = pod_resources(pod, false);
            let (lim_cpu, lim_mem) = pod_resources(pod, true);
            cpu_max = cpu_max.max(req_cpu).max(lim_cpu);
            mem_max = mem_max.max(req_mem).max(lim_mem);
        }
        if cpu_max > 0 {
            self.cpu_per_task = Some(cpu_max as i32);
        }
        if mem_max > 0 {
            self.mem_per_node = Some(mem_max / 1_048_576);
        }
    }
}

fn parse_i32(key: &str, value: &str) -> Result<i32> {
    value.parse::<i32>().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> BridgeError {
    BridgeError::InvalidAnnotation {
        key: key.to_string(),
        value: value.to_string(),
    }
}

// Sum of container cpu (cores, rounded up) and memory (bytes) for one pod,
// either requests or limits, plus pod overhead.
fn pod_resources(pod: &Pod, limits: bool) -> (i64, i64) {
    let mut cpu = 0i64;
    let mut mem = 0i64;
    let Some(spec) = pod.spec.as_ref() else {
        return (0, 0);
    };
    for container in &spec.containers {
        let Some(resources) = container.resources.as_ref() else {
            continue;
        };
        let set = if limits {
            resources.limits.as_ref()
        } else {
            resources.requests.as_ref()
        };
        let Some(set) = set else { continue };
        if let Some(q) = set.get("cpu") {
            cpu += quantity::value(q).unwrap_or(0);
        }
        if let Some(q) = set.get("memory") {
            mem += quantity::value(q).unwrap_or(0);
        }
    }
    if let Some(overhead) = spec.overhead.as_ref() {
        if let Some(q) = overhead.get("cpu") {
            cpu += quantity::value(q).unwrap_or(0);
        }
        if let Some(q) = overhead.get("memory") {
            mem += quantity::value(q).unwrap_or(0);
        }
    }
    (cpu, mem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod_with_resources(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> Pod {
        let to_map = |pairs: &[(&str, &str)]| {
            if pairs.is_empty() {
                None
            } else {
                Some(
                    pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
                        .collect::<BTreeMap<_, _>>(),
                )
            }
        };
        Pod {
            metadata: ObjectMeta::default(),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".into(),
                    resources: Some(ResourceRequirements {
                        requests: to_map(requests),
                        limits: to_map(limits),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn parses_job_ids() {
        assert_eq!(parse_job_id("42"), 42);
        assert_eq!(parse_job_id(""), 0);
        assert_eq!(parse_job_id("-1"), 0);
        assert_eq!(parse_job_id("abc"), 0);
    }

    #[test]
    fn resources_take_max_of_requests_and_limits_across_pods() {
        let pods = vec![
            pod_with_resources(&[("cpu", "2"), ("memory", "512Mi")], &[]),
            pod_with_resources(&[("cpu", "1")], &[("cpu", "4"), ("memory", "1Gi")]),
        ];
        let mut info = JobInfo::default();
        info.apply_pod_resources(&pods);
        assert_eq!(info.cpu_per_task, Some(4));
        assert_eq!(info.mem_per_node, Some(1024));
    }

    #[test]
    fn zero_resources_stay_unset() {
        let pods = vec![pod_with_resources(&[], &[])];
        let mut info = JobInfo::default();
        info.apply_pod_resources(&pods);
        assert_eq!(info.cpu_per_task, None);
        assert_eq!(info.mem_per_node, None);
    }

    #[test]
    fn annotations_override_derived_values() {
        let mut info = JobInfo {
            cpu_per_task: Some(1),
            ..Default::default()
        };
        let annotations: BTreeMap<String, String> = [
            (wellknown::ANNOTATION_ACCOUNT, "physics"),
            (wellknown::ANNOTATION_CPU_PER_TASK, "8"),
            (wellknown::ANNOTATION_MEM_PER_NODE, "2Gi"),
            (wellknown::ANNOTATION_MIN_NODES, "2"),
            (wellknown::ANNOTATION_TIME_LIMIT, "30"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        info.apply_annotations(&annotations).unwrap();
        assert_eq!(info.account.as_deref(), Some("physics"));
        assert_eq!(info.cpu_per_task, Some(8));
        assert_eq!(info.mem_per_node, Some(2048));
        assert_eq!(info.min_nodes, Some(2));
        assert_eq!(info.time_limit, Some(30));
    }

    #[test]
    fn unparseable_numeric_annotation_fails() {
        let mut info = JobInfo::default();
        let annotations: BTreeMap<String, String> = [(
            wellknown::ANNOTATION_MAX_NODES.to_string(),
            "several".to_string(),
        )]
        .into();
        let err = info.apply_annotations(&annotations).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidAnnotation { .. }));
    }

    #[test]
    fn unknown_annotations_are_ignored() {
        let mut info = JobInfo::default();
        let annotations: BTreeMap<String, String> =
            [("example.com/other".to_string(), "x".to_string())].into();
        info.apply_annotations(&annotations).unwrap();
        assert_eq!(info, JobInfo::default());
    }
}
