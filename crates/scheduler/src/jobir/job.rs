//! Batch Job translation.

use k8s_openapi::api::core::v1::Pod;

use slurm_bridge_cluster::WorkloadApi;
use slurm_bridge_domain::jobir::JobInfo;
use slurm_bridge_domain::{quantity, BridgeError, Result};

pub(super) async fn from_job(
    workloads: &dyn WorkloadApi,
    pod: &Pod,
    namespace: &str,
    name: &str,
) -> Result<(Vec<Pod>, JobInfo)> {
    let job = workloads
        .get_job(namespace, name)
        .await?
        .ok_or_else(|| BridgeError::Kube(format!("job {namespace}/{name} not found")))?;

    let mut job_info = JobInfo {
        min_nodes: Some(1),
        ..Default::default()
    };

    // Pod-level resource limits on the template, when declared, bound the
    // placeholder ask.
    let template_resources = job
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.limits.as_ref());
    if let Some(limits) = template_resources {
        if let Some(cpu) = limits.get("cpu").and_then(quantity::value) {
            job_info.cpu_per_task = Some(cpu as i32);
        }
        if let Some(mem) = limits.get("memory").and_then(quantity::mebibytes) {
            job_info.mem_per_node = Some(mem);
        }
    }

    Ok((vec![pod.clone()], job_info))
}
