//! Pod reconcile subroutines.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use slurm_bridge_cluster::PodApi;
use slurm_bridge_domain::jobir::{parse_job_id, pod_job_id_label};
use slurm_bridge_domain::{podutil, wellknown, BridgeError, Result};

use super::slurmcontrol::PodSlurmControl;

pub struct PodReconciler {
    pods: Arc<dyn PodApi>,
    slurm: Arc<dyn PodSlurmControl>,
    scheduler_name: String,
}

fn split_key(key: &str) -> (&str, &str) {
    key.split_once('/').unwrap_or(("", key))
}

impl PodReconciler {
    pub fn new(
        pods: Arc<dyn PodApi>,
        slurm: Arc<dyn PodSlurmControl>,
        scheduler_name: String,
    ) -> Self {
        Self {
            pods,
            slurm,
            scheduler_name,
        }
    }

    /// One reconcile for a `namespace/name` key. Each subroutine propagates
    /// its own error; failures do not short-circuit the others.
    pub async fn sync(&self, key: &str) -> Result<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.sync_kubernetes(key).await {
            errs.push(e);
        }
        if let Err(e) = self.sync_slurm(key).await {
            errs.push(e);
        }
        // Last, so the previous two can still read the job-id label off a
        // pod held only by the finalizer.
        if let Err(e) = self.delete_finalizer(key).await {
            errs.push(e);
        }
        BridgeError::aggregate(errs)
    }

    /// Kubernetes follows Slurm: a ready pod whose job is gone gets
    /// deleted. Slurm is the placement authority.
    async fn sync_kubernetes(&self, key: &str) -> Result<()> {
        let (namespace, name) = split_key(key);
        let Some(pod) = self.pods.get(namespace, name).await? else {
            return Ok(());
        };

        let scheduler = pod
            .spec
            .as_ref()
            .and_then(|s| s.scheduler_name.as_deref())
            .unwrap_or_default();
        if scheduler != self.scheduler_name {
            debug!(pod = %key, scheduler, "pod is not bridge-scheduled, skipping");
            return Ok(());
        }
        if !podutil::is_running_ready(&pod) {
            debug!(pod = %key, "pod is not running, skipping");
            return Ok(());
        }

        let job_id = parse_job_id(pod_job_id_label(&pod));
        if !self.slurm.is_job_running(&pod).await? {
            info!(pod = %key, job_id, "deleting pod for terminated slurm job");
            self.pods.delete(namespace, name).await?;
        }
        Ok(())
    }

    /// Slurm follows Kubernetes: when the last pod of a group terminates,
    /// the placeholder job is cancelled.
    async fn sync_slurm(&self, key: &str) -> Result<()> {
        let (namespace, name) = split_key(key);
        let Some(pod) = self.pods.get(namespace, name).await? else {
            debug!(pod = %key, "pod not found, no job to terminate");
            return Ok(());
        };

        if !podutil::is_terminating_or_terminal(&pod) {
            debug!(pod = %key, "pod is not terminated or terminating, skipping");
            return Ok(());
        }

        let label = pod_job_id_label(&pod);
        if label.is_empty() {
            return Ok(());
        }
        let siblings = self
            .pods
            .list_by_label(wellknown::LABEL_PLACEHOLDER_JOB_ID, label)
            .await?;
        let active = siblings.iter().filter(|p| podutil::is_active(p)).count();
        if active == 0 {
            let job_id = parse_job_id(label);
            info!(pod = %key, job_id, "terminating slurm job for pod");
            self.slurm.terminate_job(job_id).await?;
        }
        Ok(())
    }

    /// Strip the scheduler finalizer once the pod is on its way out.
    async fn delete_finalizer(&self, key: &str) -> Result<()> {
        let (namespace, name) = split_key(key);
        let Some(pod) = self.pods.get(namespace, name).await? else {
            return Ok(());
        };

        if !podutil::is_terminating_or_terminal(&pod) {
            return Ok(());
        }

        let Some(finalizers) = pod.metadata.finalizers.as_ref() else {
            return Ok(());
        };
        if !finalizers
            .iter()
            .any(|f| f == wellknown::FINALIZER_SCHEDULER)
        {
            return Ok(());
        }
        let remaining: Vec<String> = finalizers
            .iter()
            .filter(|f| *f != wellknown::FINALIZER_SCHEDULER)
            .cloned()
            .collect();
        self.pods
            .apply_patch(
                namespace,
                name,
                json!({ "metadata": { "finalizers": remaining } }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Pod, PodCondition, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use slurm_bridge_cluster::MemoryCluster;

    const SCHEDULER: &str = "slurm-bridge-scheduler";

    #[derive(Default)]
    struct MockPodSlurm {
        running: Mutex<BTreeMap<i32, bool>>,
        terminated: Mutex<Vec<i32>>,
    }

    impl MockPodSlurm {
        fn with_running(self, job_id: i32) -> Self {
            self.running.lock().unwrap().insert(job_id, true);
            self
        }

        fn terminated(&self) -> Vec<i32> {
            self.terminated.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PodSlurmControl for MockPodSlurm {
        async fn is_job_running(&self, pod: &Pod) -> Result<bool> {
            let job_id = parse_job_id(pod_job_id_label(pod));
            Ok(*self.running.lock().unwrap().get(&job_id).unwrap_or(&false))
        }

        async fn terminate_job(&self, job_id: i32) -> Result<()> {
            self.terminated.lock().unwrap().push(job_id);
            Ok(())
        }
    }

    fn pod(name: &str, job_id: &str, phase: &str, ready: bool, deleting: bool) -> Pod {
        let mut labels = BTreeMap::new();
        if !job_id.is_empty() {
            labels.insert(wellknown::LABEL_PLACEHOLDER_JOB_ID.to_string(), job_id.to_string());
        }
        Pod {
            metadata: ObjectMeta {
                namespace: Some("slinky".into()),
                name: Some(name.into()),
                labels: Some(labels),
                finalizers: Some(vec![wellknown::FINALIZER_SCHEDULER.to_string()]),
                deletion_timestamp: deleting.then(|| Time(Default::default())),
                ..Default::default()
            },
            spec: Some(PodSpec {
                scheduler_name: Some(SCHEDULER.into()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.into()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".into(),
                    status: if ready { "True".into() } else { "False".into() },
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn reconciler(
        cluster: &MemoryCluster,
        slurm: Arc<MockPodSlurm>,
    ) -> PodReconciler {
        PodReconciler::new(Arc::new(cluster.clone()), slurm, SCHEDULER.into())
    }

    #[tokio::test]
    async fn deletes_ready_pod_whose_job_disappeared() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("p1", "9", "Running", true, false));
        let slurm = Arc::new(MockPodSlurm::default());
        let r = reconciler(&cluster, slurm.clone());

        r.sync("slinky/p1").await.unwrap();
        assert_eq!(cluster.deleted_pods(), vec!["slinky/p1".to_string()]);
        assert!(slurm.terminated().is_empty());
    }

    #[tokio::test]
    async fn keeps_ready_pod_with_running_job() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("p1", "9", "Running", true, false));
        let slurm = Arc::new(MockPodSlurm::default().with_running(9));
        let r = reconciler(&cluster, slurm.clone());

        r.sync("slinky/p1").await.unwrap();
        assert!(cluster.deleted_pods().is_empty());
        assert!(slurm.terminated().is_empty());
    }

    #[tokio::test]
    async fn terminates_job_when_last_pod_goes_terminal() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("p1", "7", "Failed", false, false));
        let slurm = Arc::new(MockPodSlurm::default());
        let r = reconciler(&cluster, slurm.clone());

        r.sync("slinky/p1").await.unwrap();
        assert_eq!(slurm.terminated(), vec![7]);
        // Finalizer removed last.
        let stored = cluster.pod("slinky", "p1").unwrap();
        assert!(!stored
            .metadata
            .finalizers
            .unwrap_or_default()
            .contains(&wellknown::FINALIZER_SCHEDULER.to_string()));
    }

    #[tokio::test]
    async fn keeps_job_while_a_sibling_is_active() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("p1", "7", "Failed", false, false));
        cluster.add_pod(pod("p2", "7", "Running", true, false));
        let slurm = Arc::new(MockPodSlurm::default().with_running(7));
        let r = reconciler(&cluster, slurm.clone());

        r.sync("slinky/p1").await.unwrap();
        assert!(slurm.terminated().is_empty());
    }

    #[tokio::test]
    async fn skips_pods_of_other_schedulers() {
        let cluster = MemoryCluster::new();
        let mut foreign = pod("p1", "9", "Running", true, false);
        foreign.spec.as_mut().unwrap().scheduler_name = Some("default-scheduler".into());
        cluster.add_pod(foreign);
        let slurm = Arc::new(MockPodSlurm::default());
        let r = reconciler(&cluster, slurm.clone());

        r.sync("slinky/p1").await.unwrap();
        assert!(cluster.deleted_pods().is_empty());
    }

    #[tokio::test]
    async fn missing_pod_is_benign() {
        let cluster = MemoryCluster::new();
        let r = reconciler(&cluster, Arc::new(MockPodSlurm::default()));
        r.sync("slinky/ghost").await.unwrap();
    }

    #[tokio::test]
    async fn active_pod_keeps_its_finalizer() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("p1", "7", "Running", true, false));
        let slurm = Arc::new(MockPodSlurm::default().with_running(7));
        let r = reconciler(&cluster, slurm);

        r.sync("slinky/p1").await.unwrap();
        let stored = cluster.pod("slinky", "p1").unwrap();
        assert!(stored
            .metadata
            .finalizers
            .unwrap()
            .contains(&wellknown::FINALIZER_SCHEDULER.to_string()));
    }

    #[tokio::test]
    async fn deleting_pod_with_active_sibling_only_drops_finalizer() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("p1", "7", "Running", false, true));
        cluster.add_pod(pod("p2", "7", "Running", true, false));
        let slurm = Arc::new(MockPodSlurm::default().with_running(7));
        let r = reconciler(&cluster, slurm.clone());

        r.sync("slinky/p1").await.unwrap();
        assert!(slurm.terminated().is_empty());
        let stored = cluster.pod("slinky", "p1").unwrap();
        assert!(!stored
            .metadata
            .finalizers
            .unwrap_or_default()
            .contains(&wellknown::FINALIZER_SCHEDULER.to_string()));
    }
}
