//! Single-pod translation: one task on one node.

use k8s_openapi::api::core::v1::Pod;

use slurm_bridge_domain::jobir::JobInfo;

pub(super) fn from_pod(pod: &Pod) -> (Vec<Pod>, JobInfo) {
    let job_info = JobInfo {
        tasks_per_node: Some(1),
        max_nodes: Some(1),
        ..Default::default()
    };
    (vec![pod.clone()], job_info)
}
