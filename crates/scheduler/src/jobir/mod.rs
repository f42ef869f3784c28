//! Translation from a pod and its owner chain to the Slurm job IR.
//!
//! The root of the controller-owner chain decides the translation: a bare
//! pod, a batch Job, a JobSet child, a co-scheduled PodGroup or a
//! LeaderWorkerSet replica group. A pod-group label overrides the walked
//! root, since PodGroups associate by label rather than ownership.

mod job;
mod jobset;
mod lws;
mod pod;
mod podgroup;

use k8s_openapi::api::core::v1::Pod;

use slurm_bridge_cluster::{OwnerMeta, PodApi, WorkloadApi};
use slurm_bridge_domain::jobir::{JobIr, RootHandle, RootKind};
use slurm_bridge_domain::{wellknown, Result};

use crate::framework::Status;

pub use podgroup::pre_filter_pod_group;

/// Build the IR for a scheduling pod.
pub async fn translate(
    workloads: &dyn WorkloadApi,
    pods: &dyn PodApi,
    pod: &Pod,
) -> Result<JobIr> {
    let mut root = root_owner(workloads, pod).await?;

    // A PodGroup does not own its pods; the label association overrides
    // whatever the owner walk found. Job attribute annotations then come
    // from the group object.
    if let Some(group) = pod_group_name(pod) {
        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        if let Some(pg) = workloads.get_pod_group(namespace, &group).await? {
            root = OwnerMeta {
                api_version: "scheduling.x-k8s.io/v1alpha1".to_string(),
                kind: "PodGroup".to_string(),
                namespace: namespace.to_string(),
                name: group,
                labels: pg.metadata.labels.clone().unwrap_or_default(),
                annotations: pg.metadata.annotations.clone().unwrap_or_default(),
                controller_owner: None,
            };
        }
    }

    let kind = root_kind(&root);
    let (pod_set, mut job_info) = match kind {
        RootKind::Job => job::from_job(workloads, pod, &root.namespace, &root.name).await?,
        RootKind::JobSet => jobset::from_job_set(workloads, pod, &root.namespace, &root.name).await?,
        RootKind::PodGroup => {
            podgroup::from_pod_group(workloads, pods, pod, &root.namespace, &root.name).await?
        }
        RootKind::LeaderWorkerSet => {
            lws::from_lws(workloads, pods, pod, &root.namespace, &root.name).await?
        }
        RootKind::Pod | RootKind::Other => pod::from_pod(pod),
    };

    job_info.apply_pod_resources(&pod_set);
    job_info.apply_annotations(&root.annotations)?;

    Ok(JobIr {
        root: RootHandle {
            kind,
            namespace: root.namespace,
            name: root.name,
        },
        pods: pod_set,
        job_info,
    })
}

/// Kind-specific gate run before placeholder submission.
pub async fn pre_filter(workloads: &dyn WorkloadApi, pod: &Pod, ir: &JobIr) -> Status {
    match ir.root.kind {
        RootKind::PodGroup => podgroup::pre_filter_pod_group(workloads, pod, ir).await,
        RootKind::LeaderWorkerSet => lws::pre_filter_lws(workloads, pod, ir).await,
        _ => Status::success(),
    }
}

fn pod_group_name(pod: &Pod) -> Option<String> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(wellknown::LABEL_POD_GROUP))
        .filter(|v| !v.is_empty())
        .cloned()
}

fn root_kind(meta: &OwnerMeta) -> RootKind {
    match (meta.api_version.as_str(), meta.kind.as_str()) {
        ("v1", "Pod") => RootKind::Pod,
        ("batch/v1", "Job") => RootKind::Job,
        ("jobset.x-k8s.io/v1alpha2", "JobSet") => RootKind::JobSet,
        ("scheduling.x-k8s.io/v1alpha1", "PodGroup") => RootKind::PodGroup,
        ("leaderworkerset.x-k8s.io/v1", "LeaderWorkerSet") => RootKind::LeaderWorkerSet,
        _ => RootKind::Other,
    }
}

/// Walk `controller=true` owner references to the root object. Owners of
/// unknown kinds terminate the walk; the last resolved object is the root.
async fn root_owner(workloads: &dyn WorkloadApi, pod: &Pod) -> Result<OwnerMeta> {
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let mut current = OwnerMeta {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        namespace: namespace.clone(),
        name: pod.metadata.name.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        annotations: pod.metadata.annotations.clone().unwrap_or_default(),
        controller_owner: slurm_bridge_cluster::api::controller_owner(&pod.metadata),
    };

    while let Some(owner) = current.controller_owner.clone() {
        match workloads
            .get_owner_metadata(&namespace, &owner.api_version, &owner.kind, &owner.name)
            .await?
        {
            Some(meta) => current = meta,
            None => break,
        }
    }
    Ok(current)
}
