//! JobSet translation: resolve the pod's child Job and reuse the batch
//! Job path.

use k8s_openapi::api::core::v1::Pod;

use slurm_bridge_cluster::WorkloadApi;
use slurm_bridge_domain::jobir::JobInfo;
use slurm_bridge_domain::{wellknown, BridgeError, Result};

use super::job;

pub(super) async fn from_job_set(
    workloads: &dyn WorkloadApi,
    pod: &Pod,
    namespace: &str,
    name: &str,
) -> Result<(Vec<Pod>, JobInfo)> {
    workloads
        .get_job_set(namespace, name)
        .await?
        .ok_or_else(|| BridgeError::Kube(format!("jobset {namespace}/{name} not found")))?;

    // The per-pod child Job is named by the job-name label JobSet stamps
    // onto its pods.
    let child = pod
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(wellknown::LABEL_JOB_NAME))
        .cloned()
        .ok_or_else(|| {
            BridgeError::Kube(format!(
                "jobset pod {}/{} has no job-name label",
                namespace,
                pod.metadata.name.as_deref().unwrap_or_default()
            ))
        })?;

    job::from_job(workloads, pod, namespace, &child).await
}
