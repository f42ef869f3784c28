//! The SlurmBridge scheduling plugin.
//!
//! Pre-filter reconciles the scheduling pod with its placeholder job:
//! submit when missing, wait while queued, pin the pod group to the
//! allocated nodes when running. Filter then accepts only the pinned node.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use serde_json::json;
use tracing::{debug, info, warn};

use slurm_bridge_cluster::{NodeApi, PodApi, WorkloadApi};
use slurm_bridge_domain::jobir::{parse_job_id, pod_job_id_label, pod_node_annotation, JobIr};
use slurm_bridge_domain::placeholder::pod_key;
use slurm_bridge_domain::{hostlist, nodemap, taints, wellknown, BridgeError, Result};

use crate::framework::{Code, FilterPlugin, PreFilterPlugin, PreFilterResult, Status};
use crate::jobir;
use crate::slurmcontrol::SlurmControl;

pub const NAME: &str = "SlurmBridge";

pub struct SlurmBridge {
    pods: Arc<dyn PodApi>,
    nodes: Arc<dyn NodeApi>,
    workloads: Arc<dyn WorkloadApi>,
    slurm: Arc<dyn SlurmControl>,
    scheduler_name: String,
}

impl SlurmBridge {
    pub fn new(
        pods: Arc<dyn PodApi>,
        nodes: Arc<dyn NodeApi>,
        workloads: Arc<dyn WorkloadApi>,
        slurm: Arc<dyn SlurmControl>,
        scheduler_name: String,
    ) -> Self {
        Self {
            pods,
            nodes,
            workloads,
            slurm,
            scheduler_name,
        }
    }

    async fn pre_filter_inner(&self, pod: &Pod) -> (Option<PreFilterResult>, Status) {
        let mut pod = pod.clone();
        let key = pod_key(
            pod.metadata.namespace.as_deref().unwrap_or_default(),
            pod.metadata.name.as_deref().unwrap_or_default(),
        );

        // Self-heal the two reserved fields against the pod-to-job index
        // before trusting them.
        if let Err(e) = self.validate_pod_to_job(&mut pod).await {
            warn!(pod = %key, error = %e, "error validating pod against pod-to-job index");
            return (None, Status::with_reason(Code::Error, e.to_string()));
        }

        // Fast path: a sibling already determined the placeholder is
        // running and assigned this pod a node.
        let node = pod_node_annotation(&pod).to_string();
        if !pod_job_id_label(&pod).is_empty() && !node.is_empty() {
            return (
                Some(PreFilterResult::singleton(node)),
                Status::success(),
            );
        }

        let ir = match jobir::translate(self.workloads.as_ref(), self.pods.as_ref(), &pod).await {
            Ok(ir) => ir,
            Err(e) => return (None, Status::with_reason(Code::Error, e.to_string())),
        };

        let placeholder = match self.slurm.get_job(&pod).await {
            Ok(job) => job,
            Err(e) => {
                warn!(pod = %key, error = %e, "error checking for placeholder job");
                return (None, Status::with_reason(Code::Error, e.to_string()));
            }
        };

        let gate = jobir::pre_filter(self.workloads.as_ref(), &pod, &ir).await;
        if !gate.is_success() {
            // A placeholder that can no longer satisfy its group floor is
            // revoked so the next cycle starts clean.
            if gate.has_reason(&BridgeError::PlaceholderJobInvalid.to_string()) {
                warn!(pod = %key, "placeholder job no longer valid, deleting job");
                if let Err(e) = self.revoke_placeholder_job(&pod).await {
                    return (None, Status::with_reason(Code::Error, e.to_string()));
                }
            }
            return (None, gate);
        }

        if placeholder.job_id == 0 {
            // A pod that still carries a job-id label names a placeholder
            // the adapter could not see (terminal or missing); it is
            // updated rather than re-submitted so placeholder ownership
            // never forks.
            let outcome = if pod_job_id_label(&pod).is_empty() {
                self.slurm.submit_job(&pod, &ir).await
            } else {
                self.slurm.update_job(&pod, &ir).await
            };
            let job_id = match outcome {
                Ok(job_id) => job_id,
                Err(e) => {
                    if is_node_config_invalid(&e) {
                        warn!(pod = %key, "invalid node configuration for placeholder job");
                        return (
                            None,
                            Status::with_reason(
                                Code::UnschedulableAndUnresolvable,
                                BridgeError::NodeConfigInvalid.to_string(),
                            ),
                        );
                    }
                    warn!(pod = %key, error = %e, "error submitting placeholder job");
                    return (None, Status::with_reason(Code::Error, e.to_string()));
                }
            };
            debug!(pod = %key, job_id, "submitted placeholder to slurm");
            if let Err(e) = self.label_pods_with_job_id(job_id, &ir).await {
                return (None, Status::with_reason(Code::Error, e.to_string()));
            }
            return (None, Status::new(Code::Pending));
        }

        debug!(pod = %key, job_id = placeholder.job_id, "placeholder job exists");
        if placeholder.nodes.is_empty() {
            // Still queued; fold any IR growth into the job, then re-label
            // so new siblings join the placeholder.
            let job_id = match self.slurm.update_job(&pod, &ir).await {
                Ok(job_id) => job_id,
                Err(e) => {
                    warn!(pod = %key, error = %e, "error updating placeholder job");
                    return (None, Status::with_reason(Code::Pending, e.to_string()));
                }
            };
            if let Err(e) = self.label_pods_with_job_id(job_id, &ir).await {
                return (None, Status::with_reason(Code::Error, e.to_string()));
            }
            return (None, Status::with_reason(Code::Pending, "no nodes assigned"));
        }

        let slurm_nodes = match hostlist::expand(&placeholder.nodes) {
            Ok(nodes) => nodes,
            Err(e) => return (None, Status::with_reason(Code::Error, e.to_string())),
        };
        let kube_nodes = match self.slurm_to_kube_nodes(&slurm_nodes).await {
            Ok(nodes) => nodes,
            Err(e) => return (None, Status::with_reason(Code::Error, e.to_string())),
        };
        if let Err(e) = self
            .annotate_pods_with_nodes(placeholder.job_id, kube_nodes.clone(), &ir.pods)
            .await
        {
            return (None, Status::with_reason(Code::Error, e.to_string()));
        }

        // Re-read after patching so later hooks see accurate annotations.
        let fresh = match self
            .pods
            .get(
                pod.metadata.namespace.as_deref().unwrap_or_default(),
                pod.metadata.name.as_deref().unwrap_or_default(),
            )
            .await
        {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                return (
                    None,
                    Status::with_reason(Code::Error, format!("pod {key} disappeared")),
                )
            }
            Err(e) => return (None, Status::with_reason(Code::Error, e.to_string())),
        };

        let annotated = pod_node_annotation(&fresh);
        let result = if annotated.is_empty() {
            PreFilterResult {
                node_names: kube_nodes,
            }
        } else {
            PreFilterResult::singleton(annotated)
        };
        (Some(result), Status::success())
    }

    /// Consult the pod-to-job index and repair the reserved fields: a label
    /// bound to a different job is rewritten, an annotation naming a node
    /// outside the job's allocation is cleared. Patch only when changed.
    async fn validate_pod_to_job(&self, pod: &mut Pod) -> Result<()> {
        let key = pod_key(
            pod.metadata.namespace.as_deref().unwrap_or_default(),
            pod.metadata.name.as_deref().unwrap_or_default(),
        );
        let pod_to_job = self.slurm.get_jobs_for_pods().await?;
        let Some(entry) = pod_to_job.get(&key) else {
            return Ok(());
        };

        let mut patch_labels = None;
        let mut patch_annotations = None;

        let label = pod_job_id_label(pod).to_string();
        if !label.is_empty() && entry.job_id != parse_job_id(&label) {
            info!(pod = %key, label = %label, slurm_job = entry.job_id,
                "pod job-id label does not match slurm");
            patch_labels = Some(entry.job_id.to_string());
        }

        let annotation = pod_node_annotation(pod).to_string();
        if !annotation.is_empty() {
            let nodes = hostlist::expand(&entry.nodes).unwrap_or_default();
            if !nodes.contains(&annotation) {
                info!(pod = %key, annotation = %annotation, slurm_job = entry.job_id,
                    "pod node annotation does not match slurm nodes");
                patch_annotations = Some(String::new());
            }
        }

        if patch_labels.is_none() && patch_annotations.is_none() {
            return Ok(());
        }

        let mut patch = json!({ "metadata": {} });
        if let Some(new_label) = &patch_labels {
            patch["metadata"]["labels"] =
                json!({ wellknown::LABEL_PLACEHOLDER_JOB_ID: new_label });
        }
        if let Some(cleared) = &patch_annotations {
            patch["metadata"]["annotations"] =
                json!({ wellknown::ANNOTATION_PLACEHOLDER_NODE: cleared });
        }
        self.pods
            .apply_patch(
                pod.metadata.namespace.as_deref().unwrap_or_default(),
                pod.metadata.name.as_deref().unwrap_or_default(),
                patch,
            )
            .await
            .map_err(|_| BridgeError::PodUpdateFailed)?;

        // Reflect the patch locally so this cycle sees the repaired state.
        if let Some(new_label) = patch_labels {
            pod.metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert(wellknown::LABEL_PLACEHOLDER_JOB_ID.to_string(), new_label);
        }
        if let Some(cleared) = patch_annotations {
            pod.metadata
                .annotations
                .get_or_insert_with(Default::default)
                .insert(wellknown::ANNOTATION_PLACEHOLDER_NODE.to_string(), cleared);
        }
        Ok(())
    }

    /// Stamp every IR pod with the job id and the scheduler finalizer.
    /// Idempotent: already-labeled pods are skipped and the finalizer is
    /// never duplicated.
    pub(crate) async fn label_pods_with_job_id(&self, job_id: i32, ir: &JobIr) -> Result<()> {
        let value = job_id.to_string();
        for pod in &ir.pods {
            if pod_job_id_label(pod) == value {
                continue;
            }
            let mut finalizers = pod.metadata.finalizers.clone().unwrap_or_default();
            if !finalizers.iter().any(|f| f == wellknown::FINALIZER_SCHEDULER) {
                finalizers.push(wellknown::FINALIZER_SCHEDULER.to_string());
            }
            let patch = json!({
                "metadata": {
                    "labels": { wellknown::LABEL_PLACEHOLDER_JOB_ID: value },
                    "finalizers": finalizers,
                }
            });
            self.pods
                .apply_patch(
                    pod.metadata.namespace.as_deref().unwrap_or_default(),
                    pod.metadata.name.as_deref().unwrap_or_default(),
                    patch,
                )
                .await
                .map_err(|e| {
                    warn!(error = %e, "failed to update pod with slurm job id");
                    BridgeError::PodUpdateFailed
                })?;
        }
        Ok(())
    }

    /// Hand one allocated node to each pod of the running job, along with
    /// the toleration for the bridged-node taint. The allocation must cover
    /// every matching pod.
    async fn annotate_pods_with_nodes(
        &self,
        job_id: i32,
        mut kube_nodes: BTreeSet<String>,
        pods: &[Pod],
    ) -> Result<()> {
        for pod in pods {
            // Pods that joined after the placeholder was created carry no
            // matching job id yet and are skipped.
            if parse_job_id(pod_job_id_label(pod)) != job_id {
                debug!(job_id, "pod job id does not match placeholder job id");
                continue;
            }
            let existing = pod_node_annotation(pod);
            if !existing.is_empty() {
                // Keep the assignment and take its node out of circulation.
                kube_nodes.remove(existing);
                continue;
            }
            let Some(node) = kube_nodes.pop_first() else {
                warn!(job_id, "could not get a node to assign");
                return Err(BridgeError::NoKubeNode);
            };
            let toleration = taints::new_toleration_node_bridged(&self.scheduler_name);
            let tolerations = taints::merge_tolerations(
                pod.spec
                    .as_ref()
                    .and_then(|s| s.tolerations.clone())
                    .unwrap_or_default(),
                toleration,
            );
            let patch = json!({
                "metadata": {
                    "annotations": { wellknown::ANNOTATION_PLACEHOLDER_NODE: node },
                },
                "spec": { "tolerations": tolerations },
            });
            self.pods
                .apply_patch(
                    pod.metadata.namespace.as_deref().unwrap_or_default(),
                    pod.metadata.name.as_deref().unwrap_or_default(),
                    patch,
                )
                .await
                .map_err(|e| {
                    warn!(error = %e, "failed to update pod with node assignment");
                    BridgeError::PodUpdateFailed
                })?;
        }
        Ok(())
    }

    async fn slurm_to_kube_nodes(&self, slurm_nodes: &[String]) -> Result<BTreeSet<String>> {
        let node_list = self.nodes.list().await?;
        let map = nodemap::make_node_name_map(&node_list);
        Ok(slurm_nodes
            .iter()
            .map(|n| nodemap::to_kube_name(&map, n))
            .collect())
    }

    /// Delete the placeholder job and strip the reserved fields from every
    /// IR pod bound to the revoked id.
    async fn revoke_placeholder_job(&self, pod: &Pod) -> Result<()> {
        let ir = jobir::translate(self.workloads.as_ref(), self.pods.as_ref(), pod).await?;
        let job_id = pod_job_id_label(pod).to_string();
        self.slurm.delete_job(pod).await?;
        for p in &ir.pods {
            let label = pod_job_id_label(p);
            if label.is_empty() || label != job_id {
                continue;
            }
            let patch = json!({
                "metadata": {
                    "labels": { wellknown::LABEL_PLACEHOLDER_JOB_ID: null },
                    "annotations": { wellknown::ANNOTATION_PLACEHOLDER_NODE: null },
                }
            });
            self.pods
                .apply_patch(
                    p.metadata.namespace.as_deref().unwrap_or_default(),
                    p.metadata.name.as_deref().unwrap_or_default(),
                    patch,
                )
                .await?;
        }
        Ok(())
    }
}

fn is_node_config_invalid(err: &BridgeError) -> bool {
    err.to_string()
        .to_lowercase()
        .contains(&BridgeError::NodeConfigInvalid.to_string())
}

#[async_trait]
impl PreFilterPlugin for SlurmBridge {
    fn name(&self) -> &str {
        NAME
    }

    async fn pre_filter(&self, pod: &Pod) -> (Option<PreFilterResult>, Status) {
        self.pre_filter_inner(pod).await
    }
}

#[async_trait]
impl FilterPlugin for SlurmBridge {
    async fn filter(&self, pod: &Pod, node_name: &str) -> Status {
        if pod_node_annotation(pod) == node_name {
            return Status::success();
        }
        Status::with_reason(Code::Unschedulable, "node does not match annotation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use k8s_openapi::api::core::v1::{Container, Node as KubeNode, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use slurm_bridge_cluster::crds::{PodGroup, PodGroupPhase, PodGroupSpec, PodGroupStatus};
    use slurm_bridge_cluster::MemoryCluster;

    use crate::slurmcontrol::PlaceholderJob;

    #[derive(Default)]
    struct MockState {
        jobs: BTreeMap<i32, PlaceholderJob>,
        pod_to_job: BTreeMap<String, PlaceholderJob>,
        next_id: i32,
        submitted: Vec<Vec<String>>,
        updated: Vec<i32>,
        deleted: Vec<i32>,
        submit_error: Option<String>,
    }

    #[derive(Default)]
    struct MockSlurmControl {
        state: Mutex<MockState>,
    }

    impl MockSlurmControl {
        fn with_job(self, job: PlaceholderJob) -> Self {
            self.state.lock().unwrap().jobs.insert(job.job_id, job);
            self
        }

        fn with_index(self, pod: &str, job: PlaceholderJob) -> Self {
            self.state
                .lock()
                .unwrap()
                .pod_to_job
                .insert(pod.to_string(), job);
            self
        }

        fn with_submit_error(self, message: &str) -> Self {
            self.state.lock().unwrap().submit_error = Some(message.to_string());
            self
        }

        fn deleted(&self) -> Vec<i32> {
            self.state.lock().unwrap().deleted.clone()
        }

        fn updated(&self) -> Vec<i32> {
            self.state.lock().unwrap().updated.clone()
        }

        fn submitted(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().submitted.clone()
        }
    }

    #[async_trait]
    impl SlurmControl for MockSlurmControl {
        async fn delete_job(&self, pod: &Pod) -> Result<()> {
            let job_id = parse_job_id(pod_job_id_label(pod));
            if job_id == 0 {
                return Ok(());
            }
            let mut state = self.state.lock().unwrap();
            state.jobs.remove(&job_id);
            state.deleted.push(job_id);
            Ok(())
        }

        async fn get_jobs_for_pods(&self) -> Result<BTreeMap<String, PlaceholderJob>> {
            Ok(self.state.lock().unwrap().pod_to_job.clone())
        }

        async fn get_job(&self, pod: &Pod) -> Result<PlaceholderJob> {
            let job_id = parse_job_id(pod_job_id_label(pod));
            if job_id == 0 {
                return Ok(PlaceholderJob::default());
            }
            Ok(self
                .state
                .lock()
                .unwrap()
                .jobs
                .get(&job_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn submit_job(&self, _pod: &Pod, ir: &JobIr) -> Result<i32> {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = &state.submit_error {
                return Err(BridgeError::Slurm(message.clone()));
            }
            state.next_id += 1;
            let job_id = state.next_id;
            state.submitted.push(
                ir.pods
                    .iter()
                    .map(|p| {
                        pod_key(
                            p.metadata.namespace.as_deref().unwrap_or_default(),
                            p.metadata.name.as_deref().unwrap_or_default(),
                        )
                    })
                    .collect(),
            );
            state.jobs.insert(
                job_id,
                PlaceholderJob {
                    job_id,
                    nodes: String::new(),
                },
            );
            Ok(job_id)
        }

        async fn update_job(&self, pod: &Pod, _ir: &JobIr) -> Result<i32> {
            let job_id = parse_job_id(pod_job_id_label(pod));
            self.state.lock().unwrap().updated.push(job_id);
            Ok(job_id)
        }
    }

    fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some(namespace.into()),
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".into(),
                    ..Default::default()
                }],
                scheduler_name: Some("slurm-bridge-scheduler".into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn labeled(mut pod: Pod, job_id: &str) -> Pod {
        pod.metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(wellknown::LABEL_PLACEHOLDER_JOB_ID.into(), job_id.into());
        pod
    }

    fn annotated(mut pod: Pod, node: &str) -> Pod {
        pod.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(wellknown::ANNOTATION_PLACEHOLDER_NODE.into(), node.into());
        pod
    }

    fn kube_node(name: &str) -> KubeNode {
        KubeNode {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn plugin(cluster: &MemoryCluster, slurm: Arc<MockSlurmControl>) -> SlurmBridge {
        SlurmBridge::new(
            Arc::new(cluster.clone()),
            Arc::new(cluster.clone()),
            Arc::new(cluster.clone()),
            slurm,
            "slurm-bridge-scheduler".into(),
        )
    }

    #[tokio::test]
    async fn first_cycle_submits_and_labels_siblings() {
        let cluster = MemoryCluster::new();
        let p1 = pod("slinky", "p1");
        cluster.add_pod(p1.clone());
        let slurm = Arc::new(MockSlurmControl::default());
        let sb = plugin(&cluster, slurm.clone());

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(result.is_none());
        assert_eq!(status.code(), Code::Pending);
        assert_eq!(slurm.submitted(), vec![vec!["slinky/p1".to_string()]]);

        let stored = cluster.pod("slinky", "p1").unwrap();
        assert_eq!(pod_job_id_label(&stored), "1");
        assert!(stored
            .metadata
            .finalizers
            .unwrap()
            .contains(&wellknown::FINALIZER_SCHEDULER.to_string()));
    }

    #[tokio::test]
    async fn running_job_pins_pod_and_returns_node() {
        let cluster = MemoryCluster::new();
        let p1 = labeled(pod("slinky", "p1"), "42");
        cluster.add_pod(p1.clone());
        cluster.add_node(kube_node("nA"));
        let slurm = Arc::new(MockSlurmControl::default().with_job(PlaceholderJob {
            job_id: 42,
            nodes: "nA".into(),
        }));
        let sb = plugin(&cluster, slurm);

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(status.is_success());
        assert_eq!(result.unwrap(), PreFilterResult::singleton("nA"));

        let stored = cluster.pod("slinky", "p1").unwrap();
        assert_eq!(pod_node_annotation(&stored), "nA");
        let tolerations = stored.spec.unwrap().tolerations.unwrap();
        assert!(tolerations
            .iter()
            .any(|t| t.key.as_deref() == Some(wellknown::TAINT_KEY_BRIDGED_NODE)));
    }

    #[tokio::test]
    async fn node_name_map_translates_allocation() {
        let cluster = MemoryCluster::new();
        let p1 = labeled(pod("slinky", "p1"), "42");
        cluster.add_pod(p1.clone());
        let mut node = kube_node("kube-1");
        node.metadata.labels = Some(
            [(
                wellknown::LABEL_SLURM_NODE_NAME.to_string(),
                "slurm-1".to_string(),
            )]
            .into(),
        );
        cluster.add_node(node);
        let slurm = Arc::new(MockSlurmControl::default().with_job(PlaceholderJob {
            job_id: 42,
            nodes: "slurm-1".into(),
        }));
        let sb = plugin(&cluster, slurm);

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(status.is_success());
        assert_eq!(result.unwrap(), PreFilterResult::singleton("kube-1"));
    }

    #[tokio::test]
    async fn fast_path_returns_annotated_node() {
        let cluster = MemoryCluster::new();
        let p1 = annotated(labeled(pod("slinky", "p1"), "42"), "nA");
        cluster.add_pod(p1.clone());
        let slurm = Arc::new(MockSlurmControl::default().with_index(
            "slinky/p1",
            PlaceholderJob {
                job_id: 42,
                nodes: "nA".into(),
            },
        ));
        let sb = plugin(&cluster, slurm);

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(status.is_success());
        assert_eq!(result.unwrap(), PreFilterResult::singleton("nA"));
    }

    #[tokio::test]
    async fn validate_corrects_stale_job_id_label() {
        let cluster = MemoryCluster::new();
        let p1 = annotated(labeled(pod("slinky", "p1"), "41"), "nA");
        cluster.add_pod(p1.clone());
        let slurm = Arc::new(MockSlurmControl::default().with_index(
            "slinky/p1",
            PlaceholderJob {
                job_id: 42,
                nodes: "nA".into(),
            },
        ));
        let sb = plugin(&cluster, slurm);

        let (_, status) = sb.pre_filter(&p1).await;
        assert!(status.is_success());
        let stored = cluster.pod("slinky", "p1").unwrap();
        assert_eq!(pod_job_id_label(&stored), "42");
    }

    #[tokio::test]
    async fn validate_clears_annotation_outside_allocation() {
        let cluster = MemoryCluster::new();
        let p1 = annotated(labeled(pod("slinky", "p1"), "42"), "nB");
        cluster.add_pod(p1.clone());
        cluster.add_node(kube_node("nA"));
        let slurm = Arc::new(
            MockSlurmControl::default()
                .with_index(
                    "slinky/p1",
                    PlaceholderJob {
                        job_id: 42,
                        nodes: "nA".into(),
                    },
                )
                .with_job(PlaceholderJob {
                    job_id: 42,
                    nodes: "nA".into(),
                }),
        );
        let sb = plugin(&cluster, slurm);

        let (result, status) = sb.pre_filter(&p1).await;
        // The stale annotation is cleared, then the running job re-pins the
        // pod to the allocated node.
        assert!(status.is_success());
        assert_eq!(result.unwrap(), PreFilterResult::singleton("nA"));
        let stored = cluster.pod("slinky", "p1").unwrap();
        assert_eq!(pod_node_annotation(&stored), "nA");
    }

    #[tokio::test]
    async fn queued_job_is_updated_and_stays_pending() {
        let cluster = MemoryCluster::new();
        let p1 = labeled(pod("slinky", "p1"), "7");
        cluster.add_pod(p1.clone());
        let slurm = Arc::new(MockSlurmControl::default().with_job(PlaceholderJob {
            job_id: 7,
            nodes: String::new(),
        }));
        let sb = plugin(&cluster, slurm.clone());

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(result.is_none());
        assert_eq!(status.code(), Code::Pending);
        assert!(status.has_reason("no nodes assigned"));
        assert_eq!(slurm.updated(), vec![7]);
    }

    #[tokio::test]
    async fn labeled_pod_without_visible_job_is_updated_not_resubmitted() {
        let cluster = MemoryCluster::new();
        // The job the label names is gone from slurm's view.
        let p1 = labeled(pod("slinky", "p1"), "8");
        cluster.add_pod(p1.clone());
        let slurm = Arc::new(MockSlurmControl::default());
        let sb = plugin(&cluster, slurm.clone());

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(result.is_none());
        assert_eq!(status.code(), Code::Pending);
        assert!(slurm.submitted().is_empty());
        assert_eq!(slurm.updated(), vec![8]);
    }

    #[tokio::test]
    async fn unsatisfiable_submission_is_unresolvable() {
        let cluster = MemoryCluster::new();
        let p1 = pod("slinky", "p1");
        cluster.add_pod(p1.clone());
        let slurm = Arc::new(
            MockSlurmControl::default()
                .with_submit_error("Requested node configuration is not available"),
        );
        let sb = plugin(&cluster, slurm);

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(result.is_none());
        assert_eq!(status.code(), Code::UnschedulableAndUnresolvable);
    }

    #[tokio::test]
    async fn under_floor_pod_group_revokes_placeholder() {
        let cluster = MemoryCluster::new();
        let mut p1 = labeled(pod("slinky", "p1"), "5");
        let mut p2 = pod("slinky", "p2");
        for p in [&mut p1, &mut p2] {
            p.metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert(wellknown::LABEL_POD_GROUP.into(), "pg".into());
        }
        cluster.add_pod(p1.clone());
        cluster.add_pod(p2.clone());
        cluster.add_pod_group(PodGroup {
            metadata: ObjectMeta {
                namespace: Some("slinky".into()),
                name: Some("pg".into()),
                ..Default::default()
            },
            spec: PodGroupSpec {
                min_member: 3,
                min_resources: None,
            },
            status: Some(PodGroupStatus {
                phase: PodGroupPhase::Scheduling,
            }),
        });
        let slurm = Arc::new(MockSlurmControl::default().with_job(PlaceholderJob {
            job_id: 5,
            nodes: String::new(),
        }));
        let sb = plugin(&cluster, slurm.clone());

        let (result, status) = sb.pre_filter(&p1).await;
        assert!(result.is_none());
        assert_eq!(status.code(), Code::Error);
        assert!(status.has_reason(&BridgeError::PlaceholderJobInvalid.to_string()));
        assert_eq!(slurm.deleted(), vec![5]);
        let stored = cluster.pod("slinky", "p1").unwrap();
        assert_eq!(pod_job_id_label(&stored), "");
        assert_eq!(pod_node_annotation(&stored), "");
    }

    #[tokio::test]
    async fn terminal_pod_group_is_unresolvable() {
        let cluster = MemoryCluster::new();
        let mut p1 = pod("slinky", "p1");
        p1.metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(wellknown::LABEL_POD_GROUP.into(), "pg".into());
        cluster.add_pod(p1.clone());
        cluster.add_pod_group(PodGroup {
            metadata: ObjectMeta {
                namespace: Some("slinky".into()),
                name: Some("pg".into()),
                ..Default::default()
            },
            spec: PodGroupSpec {
                min_member: 1,
                min_resources: None,
            },
            status: Some(PodGroupStatus {
                phase: PodGroupPhase::Running,
            }),
        });
        let sb = plugin(&cluster, Arc::new(MockSlurmControl::default()));

        let (_, status) = sb.pre_filter(&p1).await;
        assert_eq!(status.code(), Code::UnschedulableAndUnresolvable);
        assert!(status.has_reason(&BridgeError::PodGroupRunning.to_string()));
    }

    #[tokio::test]
    async fn allocation_shorter_than_group_is_an_error() {
        let cluster = MemoryCluster::new();
        let mut p1 = labeled(pod("slinky", "p1"), "9");
        let mut p2 = labeled(pod("slinky", "p2"), "9");
        for p in [&mut p1, &mut p2] {
            p.metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert(wellknown::LABEL_POD_GROUP.into(), "pg".into());
        }
        cluster.add_pod(p1.clone());
        cluster.add_pod(p2.clone());
        cluster.add_node(kube_node("nA"));
        cluster.add_pod_group(PodGroup {
            metadata: ObjectMeta {
                namespace: Some("slinky".into()),
                name: Some("pg".into()),
                ..Default::default()
            },
            spec: PodGroupSpec {
                min_member: 2,
                min_resources: None,
            },
            status: Some(PodGroupStatus {
                phase: PodGroupPhase::Scheduling,
            }),
        });
        let slurm = Arc::new(MockSlurmControl::default().with_job(PlaceholderJob {
            job_id: 9,
            nodes: "nA".into(),
        }));
        let sb = plugin(&cluster, slurm);

        let (_, status) = sb.pre_filter(&p1).await;
        assert_eq!(status.code(), Code::Error);
        assert!(status.has_reason(&BridgeError::NoKubeNode.to_string()));
    }

    #[tokio::test]
    async fn sibling_labeling_is_idempotent() {
        let cluster = MemoryCluster::new();
        let p1 = pod("slinky", "p1");
        cluster.add_pod(p1.clone());
        let sb = plugin(&cluster, Arc::new(MockSlurmControl::default()));

        let ir = JobIr {
            root: slurm_bridge_domain::jobir::RootHandle {
                kind: slurm_bridge_domain::jobir::RootKind::Pod,
                namespace: "slinky".into(),
                name: "p1".into(),
            },
            pods: vec![p1],
            job_info: Default::default(),
        };
        sb.label_pods_with_job_id(3, &ir).await.unwrap();
        // Re-run against the stored pod, as a second cycle would.
        let stored = cluster.pod("slinky", "p1").unwrap();
        let ir = JobIr {
            pods: vec![stored],
            ..ir
        };
        sb.label_pods_with_job_id(3, &ir).await.unwrap();

        let stored = cluster.pod("slinky", "p1").unwrap();
        let finalizers = stored.metadata.finalizers.clone().unwrap();
        assert_eq!(
            finalizers
                .iter()
                .filter(|f| *f == wellknown::FINALIZER_SCHEDULER)
                .count(),
            1
        );
        assert_eq!(pod_job_id_label(&stored), "3");
    }

    #[tokio::test]
    async fn filter_accepts_only_the_annotated_node() {
        let cluster = MemoryCluster::new();
        let sb = plugin(&cluster, Arc::new(MockSlurmControl::default()));
        let p1 = annotated(pod("slinky", "p1"), "nA");

        assert!(sb.filter(&p1, "nA").await.is_success());
        let status = sb.filter(&p1, "nB").await;
        assert_eq!(status.code(), Code::Unschedulable);
        assert!(status.has_reason("node does not match annotation"));
    }
}
