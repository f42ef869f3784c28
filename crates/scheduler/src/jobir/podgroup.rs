//! PodGroup translation and its pre-filter gate.

use k8s_openapi::api::core::v1::Pod;

use slurm_bridge_cluster::crds::PodGroupPhase;
use slurm_bridge_cluster::{PodApi, WorkloadApi};
use slurm_bridge_domain::jobir::{pod_job_id_label, JobInfo, JobIr};
use slurm_bridge_domain::{quantity, wellknown, BridgeError, Result};

use crate::framework::{Code, Status};

pub(super) async fn from_pod_group(
    workloads: &dyn WorkloadApi,
    pods: &dyn PodApi,
    pod: &Pod,
    namespace: &str,
    name: &str,
) -> Result<(Vec<Pod>, JobInfo)> {
    let group = workloads
        .get_pod_group(namespace, name)
        .await?
        .ok_or(BridgeError::PodGroupGet)?;

    let label = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(wellknown::LABEL_POD_GROUP))
        .cloned()
        .unwrap_or_default();
    let members = pods
        .list_by_label(wellknown::LABEL_POD_GROUP, &label)
        .await?;

    let mut job_info = JobInfo {
        max_nodes: Some(members.len() as i32),
        tasks_per_node: Some(1),
        ..Default::default()
    };
    if group.spec.min_member > 0 {
        job_info.min_nodes = Some(group.spec.min_member);
    }
    if let Some(resources) = group.spec.min_resources.as_ref() {
        if let Some(cpu) = resources.get("cpu").and_then(quantity::value) {
            if cpu > 0 {
                job_info.cpu_per_task = Some(cpu as i32);
            }
        }
        if let Some(mem) = resources.get("memory").and_then(quantity::mebibytes) {
            if mem > 0 {
                job_info.mem_per_node = Some(mem);
            }
        }
    }

    Ok((members, job_info))
}

/// Gate scheduling on the group's phase and member floor.
///
/// Pods of groups in a terminal or unknown phase are never schedulable
/// here. Below the member floor there are two cases: a pod without a
/// placeholder simply waits for siblings, while a pod that already holds a
/// placeholder signals that the placeholder is no longer valid and must be
/// revoked.
pub async fn pre_filter_pod_group(
    workloads: &dyn WorkloadApi,
    pod: &Pod,
    ir: &JobIr,
) -> Status {
    let group = match workloads
        .get_pod_group(&ir.root.namespace, &ir.root.name)
        .await
    {
        Ok(Some(group)) => group,
        Ok(None) | Err(_) => {
            return Status::with_reason(Code::Error, BridgeError::PodGroupGet.to_string())
        }
    };

    let phase = group.status.map(|s| s.phase).unwrap_or_default();
    let terminal = match phase {
        PodGroupPhase::Running => Some(BridgeError::PodGroupRunning),
        PodGroupPhase::Unknown => Some(BridgeError::PodGroupUnknown),
        PodGroupPhase::Failed => Some(BridgeError::PodGroupFailed),
        PodGroupPhase::Finished => Some(BridgeError::PodGroupFinished),
        _ => None,
    };
    if let Some(err) = terminal {
        return Status::with_reason(Code::UnschedulableAndUnresolvable, err.to_string());
    }

    // Count only members whose placeholder label matches the scheduling
    // pod's; members of another (or no) placeholder do not satisfy this
    // pod's floor.
    let own_label = pod_job_id_label(pod);
    let waiting = ir
        .pods
        .iter()
        .filter(|p| pod_job_id_label(p) == own_label)
        .count() as i32;

    if waiting < group.spec.min_member {
        let err = if own_label.is_empty() {
            BridgeError::InsufficientPods
        } else {
            BridgeError::PlaceholderJobInvalid
        };
        return Status::with_reason(Code::Error, err.to_string());
    }
    Status::success()
}
