//! In-memory implementation of the cluster seams for tests.
//!
//! Mirrors the merge-patch semantics the real implementation relies on so
//! plugin and reconciler tests observe the same label/annotation/finalizer
//! mutations they would produce against a live API server.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use serde_json::Value;

use slurm_bridge_domain::{placeholder::pod_key, BridgeError, Result};

use crate::api::{controller_owner, NamespaceApi, NodeApi, OwnerMeta, PodApi, WorkloadApi};
use crate::crds::{JobSet, LeaderWorkerSet, PodGroup};

#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    pods: BTreeMap<String, Pod>,
    nodes: BTreeMap<String, Node>,
    namespaces: BTreeMap<String, Namespace>,
    jobs: BTreeMap<String, Job>,
    pod_groups: BTreeMap<String, PodGroup>,
    job_sets: BTreeMap<String, JobSet>,
    leader_worker_sets: BTreeMap<String, LeaderWorkerSet>,
    extra_owners: BTreeMap<String, OwnerMeta>,
    bindings: Vec<(String, String)>,
    deleted_pods: Vec<String>,
}

fn object_key(namespace: &str, name: &str) -> String {
    pod_key(namespace, name)
}

/// RFC 7386 merge patch.
fn merge(target: &mut Value, patch: &Value) {
    match patch.as_object() {
        Some(pobj) => {
            if !target.is_object() {
                *target = Value::Object(Default::default());
            }
            let tobj = target.as_object_mut().unwrap();
            for (k, v) in pobj {
                if v.is_null() {
                    tobj.remove(k);
                } else if v.is_object() {
                    merge(tobj.entry(k.clone()).or_insert(Value::Null), v);
                } else {
                    tobj.insert(k.clone(), v.clone());
                }
            }
        }
        None => *target = patch.clone(),
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pod(&self, pod: Pod) {
        let key = object_key(
            pod.metadata.namespace.as_deref().unwrap_or_default(),
            pod.metadata.name.as_deref().unwrap_or_default(),
        );
        self.state.lock().unwrap().pods.insert(key, pod);
    }

    pub fn add_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.state.lock().unwrap().nodes.insert(name, node);
    }

    pub fn add_namespace(&self, namespace: Namespace) {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        self.state.lock().unwrap().namespaces.insert(name, namespace);
    }

    pub fn add_job(&self, job: Job) {
        let key = object_key(
            job.metadata.namespace.as_deref().unwrap_or_default(),
            job.metadata.name.as_deref().unwrap_or_default(),
        );
        self.state.lock().unwrap().jobs.insert(key, job);
    }

    pub fn add_pod_group(&self, pg: PodGroup) {
        let key = object_key(
            pg.metadata.namespace.as_deref().unwrap_or_default(),
            pg.metadata.name.as_deref().unwrap_or_default(),
        );
        self.state.lock().unwrap().pod_groups.insert(key, pg);
    }

    pub fn add_job_set(&self, js: JobSet) {
        let key = object_key(
            js.metadata.namespace.as_deref().unwrap_or_default(),
            js.metadata.name.as_deref().unwrap_or_default(),
        );
        self.state.lock().unwrap().job_sets.insert(key, js);
    }

    pub fn add_leader_worker_set(&self, lws: LeaderWorkerSet) {
        let key = object_key(
            lws.metadata.namespace.as_deref().unwrap_or_default(),
            lws.metadata.name.as_deref().unwrap_or_default(),
        );
        self.state
            .lock()
            .unwrap()
            .leader_worker_sets
            .insert(key, lws);
    }

    /// Register owner metadata for kinds without a typed store, e.g. a
    /// ReplicaSet link in an owner chain.
    pub fn add_owner(&self, meta: OwnerMeta) {
        let key = format!("{}/{}", meta.kind, object_key(&meta.namespace, &meta.name));
        self.state.lock().unwrap().extra_owners.insert(key, meta);
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .unwrap()
            .pods
            .get(&object_key(namespace, name))
            .cloned()
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.state.lock().unwrap().nodes.get(name).cloned()
    }

    pub fn bindings(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().bindings.clone()
    }

    pub fn deleted_pods(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_pods.clone()
    }
}

#[async_trait]
impl PodApi for MemoryCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self.pod(namespace, name))
    }

    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<Pod>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .values()
            .filter(|p| {
                p.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(key))
                    .map(|v| v == value)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn list_pending_for_scheduler(&self, scheduler_name: &str) -> Result<Vec<Pod>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .values()
            .filter(|p| {
                let spec = p.spec.as_ref();
                spec.and_then(|s| s.scheduler_name.as_deref()) == Some(scheduler_name)
                    && spec.and_then(|s| s.node_name.as_deref()).is_none()
            })
            .cloned()
            .collect())
    }

    async fn apply_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = object_key(namespace, name);
        let pod = state
            .pods
            .get(&key)
            .ok_or_else(|| BridgeError::Kube(format!("pod {key} not found")))?;
        let mut value = serde_json::to_value(pod).map_err(|e| BridgeError::Kube(e.to_string()))?;
        merge(&mut value, &patch);
        let patched: Pod =
            serde_json::from_value(value).map_err(|e| BridgeError::Kube(e.to_string()))?;
        state.pods.insert(key, patched);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = object_key(namespace, name);
        state.pods.remove(&key);
        state.deleted_pods.push(key);
        Ok(())
    }

    async fn bind(&self, namespace: &str, name: &str, node: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = object_key(namespace, name);
        let pod = state
            .pods
            .get_mut(&key)
            .ok_or_else(|| BridgeError::Kube(format!("pod {key} not found")))?;
        if let Some(spec) = pod.spec.as_mut() {
            spec.node_name = Some(node.to_string());
        }
        state.bindings.push((key, node.to_string()));
        Ok(())
    }
}

#[async_trait]
impl NodeApi for MemoryCluster {
    async fn get(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.node(name))
    }

    async fn list(&self) -> Result<Vec<Node>> {
        Ok(self.state.lock().unwrap().nodes.values().cloned().collect())
    }

    async fn apply_patch(&self, name: &str, patch: serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get(name)
            .ok_or_else(|| BridgeError::Kube(format!("node {name} not found")))?;
        let mut value =
            serde_json::to_value(node).map_err(|e| BridgeError::Kube(e.to_string()))?;
        merge(&mut value, &patch);
        let patched: Node =
            serde_json::from_value(value).map_err(|e| BridgeError::Kube(e.to_string()))?;
        state.nodes.insert(name.to_string(), patched);
        Ok(())
    }
}

#[async_trait]
impl NamespaceApi for MemoryCluster {
    async fn list(&self) -> Result<Vec<Namespace>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .namespaces
            .values()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WorkloadApi for MemoryCluster {
    async fn get_owner_metadata(
        &self,
        namespace: &str,
        _api_version: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<OwnerMeta>> {
        let state = self.state.lock().unwrap();
        let key = object_key(namespace, name);

        let from_meta = |api_version: &str,
                         kind: &str,
                         meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta| {
            OwnerMeta {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                labels: meta.labels.clone().unwrap_or_default(),
                annotations: meta.annotations.clone().unwrap_or_default(),
                controller_owner: controller_owner(meta),
            }
        };

        let meta = match kind {
            "Pod" => state.pods.get(&key).map(|o| from_meta("v1", "Pod", &o.metadata)),
            "Job" => state
                .jobs
                .get(&key)
                .map(|o| from_meta("batch/v1", "Job", &o.metadata)),
            "JobSet" => state
                .job_sets
                .get(&key)
                .map(|o| from_meta("jobset.x-k8s.io/v1alpha2", "JobSet", &o.metadata)),
            "PodGroup" => state
                .pod_groups
                .get(&key)
                .map(|o| from_meta("scheduling.x-k8s.io/v1alpha1", "PodGroup", &o.metadata)),
            "LeaderWorkerSet" => state.leader_worker_sets.get(&key).map(|o| {
                from_meta("leaderworkerset.x-k8s.io/v1", "LeaderWorkerSet", &o.metadata)
            }),
            _ => state.extra_owners.get(&format!("{kind}/{key}")).cloned(),
        };
        Ok(meta)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .get(&object_key(namespace, name))
            .cloned())
    }

    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<Option<PodGroup>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pod_groups
            .get(&object_key(namespace, name))
            .cloned())
    }

    async fn get_job_set(&self, namespace: &str, name: &str) -> Result<Option<JobSet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .job_sets
            .get(&object_key(namespace, name))
            .cloned())
    }

    async fn get_leader_worker_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LeaderWorkerSet>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .leader_worker_sets
            .get(&object_key(namespace, name))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some(namespace.into()),
                name: Some(name.into()),
                labels: Some([("team".to_string(), "hpc".to_string())].into()),
                ..Default::default()
            },
            spec: Some(PodSpec::default()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn patch_merges_and_deletes_labels() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("slinky", "p1"));

        PodApi::apply_patch(
            &cluster,
            "slinky",
            "p1",
            serde_json::json!({"metadata": {"labels": {"jobid": "42", "team": null}}}),
        )
        .await
        .unwrap();

        let labels = cluster.pod("slinky", "p1").unwrap().metadata.labels.unwrap();
        assert_eq!(labels.get("jobid"), Some(&"42".to_string()));
        assert!(!labels.contains_key("team"));
    }

    #[tokio::test]
    async fn list_by_label_filters() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("slinky", "p1"));
        cluster.add_pod(pod("other", "p2"));

        let pods = cluster.list_by_label("team", "hpc").await.unwrap();
        assert_eq!(pods.len(), 2);
        let none = cluster.list_by_label("team", "web").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn bind_records_target_node() {
        let cluster = MemoryCluster::new();
        cluster.add_pod(pod("slinky", "p1"));
        cluster.bind("slinky", "p1", "nA").await.unwrap();
        assert_eq!(cluster.bindings(), vec![("slinky/p1".to_string(), "nA".to_string())]);
        let bound = cluster.pod("slinky", "p1").unwrap();
        assert_eq!(bound.spec.unwrap().node_name.as_deref(), Some("nA"));
    }
}
