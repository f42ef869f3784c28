//! LeaderWorkerSet translation and its pre-filter gate.

use k8s_openapi::api::core::v1::Pod;

use slurm_bridge_cluster::{PodApi, WorkloadApi};
use slurm_bridge_domain::jobir::{pod_job_id_label, JobInfo, JobIr};
use slurm_bridge_domain::{wellknown, BridgeError, Result};

use crate::framework::{Code, Status};

fn pod_label<'a>(pod: &'a Pod, key: &str) -> &'a str {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(key))
        .map(String::as_str)
        .unwrap_or("")
}

pub(super) async fn from_lws(
    workloads: &dyn WorkloadApi,
    pods: &dyn PodApi,
    pod: &Pod,
    namespace: &str,
    name: &str,
) -> Result<(Vec<Pod>, JobInfo)> {
    let lws = workloads
        .get_leader_worker_set(namespace, name)
        .await?
        .ok_or(BridgeError::LwsGet)?;

    // Every pod of a replica group shares the group-unique hash label.
    let group_key = pod_label(pod, wellknown::LABEL_LWS_GROUP_KEY);
    let members = pods
        .list_by_label(wellknown::LABEL_LWS_GROUP_KEY, group_key)
        .await?;
    if members.is_empty() {
        return Err(BridgeError::LwsNoPods);
    }

    let size = lws.spec.leader_worker_template.size.unwrap_or(1);
    let job_info = JobInfo {
        job_name: Some(format!(
            "{}-{}",
            pod_label(pod, wellknown::LABEL_LWS_NAME),
            pod_label(pod, wellknown::LABEL_LWS_GROUP_INDEX)
        )),
        min_nodes: Some(size),
        max_nodes: Some(size),
        tasks_per_node: Some(1),
        ..Default::default()
    };

    Ok((members, job_info))
}

/// Gate scheduling on the replica group being complete.
pub(super) async fn pre_filter_lws(
    workloads: &dyn WorkloadApi,
    pod: &Pod,
    ir: &JobIr,
) -> Status {
    let lws = match workloads
        .get_leader_worker_set(&ir.root.namespace, &ir.root.name)
        .await
    {
        Ok(Some(lws)) => lws,
        Ok(None) | Err(_) => {
            return Status::with_reason(Code::Error, BridgeError::LwsGet.to_string())
        }
    };

    let size = lws.spec.leader_worker_template.size.unwrap_or(1);
    if (ir.pods.len() as i32) < size {
        let err = if pod_job_id_label(pod).is_empty() {
            BridgeError::InsufficientPods
        } else {
            BridgeError::PlaceholderJobInvalid
        };
        return Status::with_reason(Code::Error, err.to_string());
    }
    Status::success()
}
