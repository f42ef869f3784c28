//! kube-rs implementation of the cluster trait seams.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use tracing::debug;

use slurm_bridge_domain::{BridgeError, Result};

use crate::api::{controller_owner, NamespaceApi, NodeApi, OwnerMeta, PodApi, WorkloadApi};
use crate::crds::{JobSet, LeaderWorkerSet, PodGroup};

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn kube_err(err: kube::Error) -> BridgeError {
    BridgeError::Kube(err.to_string())
}

// Owner kinds the walk can fetch. Anything else terminates the walk and
// falls through to the single-pod translation.
fn api_resource_for(api_version: &str, kind: &str) -> Option<ApiResource> {
    const KNOWN: &[&str] = &[
        "Pod",
        "Job",
        "CronJob",
        "JobSet",
        "PodGroup",
        "LeaderWorkerSet",
        "ReplicaSet",
        "Deployment",
        "StatefulSet",
        "DaemonSet",
    ];
    if !KNOWN.contains(&kind) {
        return None;
    }
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };
    Some(ApiResource::from_gvk(&GroupVersionKind::gvk(
        group, version, kind,
    )))
}

#[async_trait]
impl PodApi for KubeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        self.pods(namespace).get_opt(name).await.map_err(kube_err)
    }

    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(&format!("{key}={value}"));
        Ok(api.list(&lp).await.map_err(kube_err)?.items)
    }

    async fn list_pending_for_scheduler(&self, scheduler_name: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let lp = ListParams::default()
            .fields(&format!("spec.schedulerName={scheduler_name},spec.nodeName="));
        Ok(api.list(&lp).await.map_err(kube_err)?.items)
    }

    async fn apply_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: serde_json::Value,
    ) -> Result<()> {
        self.pods(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(kube_err)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self.pods(namespace).delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(pod = %format!("{namespace}/{name}"), "pod already deleted");
                Ok(())
            }
            Err(e) => Err(kube_err(e)),
        }
    }

    async fn bind(&self, namespace: &str, name: &str, node: &str) -> Result<()> {
        let binding = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Binding",
            "metadata": { "name": name },
            "target": { "apiVersion": "v1", "kind": "Node", "name": node },
        });
        let data = serde_json::to_vec(&binding)
            .map_err(|e| BridgeError::Kube(format!("encode binding: {e}")))?;
        self.pods(namespace)
            .create_subresource::<serde_json::Value>(
                "binding",
                name,
                &PostParams::default(),
                data,
            )
            .await
            .map(|_| ())
            .map_err(kube_err)
    }
}

#[async_trait]
impl NodeApi for KubeCluster {
    async fn get(&self, name: &str) -> Result<Option<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get_opt(name).await.map_err(kube_err)
    }

    async fn list(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api
            .list(&ListParams::default())
            .await
            .map_err(kube_err)?
            .items)
    }

    async fn apply_patch(&self, name: &str, patch: serde_json::Value) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(kube_err)
    }
}

#[async_trait]
impl NamespaceApi for KubeCluster {
    async fn list(&self) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api
            .list(&ListParams::default())
            .await
            .map_err(kube_err)?
            .items)
    }
}

#[async_trait]
impl WorkloadApi for KubeCluster {
    async fn get_owner_metadata(
        &self,
        namespace: &str,
        api_version: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<OwnerMeta>> {
        let Some(resource) = api_resource_for(api_version, kind) else {
            return Ok(None);
        };
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);
        let Some(obj) = api.get_opt(name).await.map_err(kube_err)? else {
            return Ok(None);
        };
        Ok(Some(OwnerMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            labels: obj.metadata.labels.clone().unwrap_or_default(),
            annotations: obj.metadata.annotations.clone().unwrap_or_default(),
            controller_owner: controller_owner(&obj.metadata),
        }))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(kube_err)
    }

    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<Option<PodGroup>> {
        let api: Api<PodGroup> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(kube_err)
    }

    async fn get_job_set(&self, namespace: &str, name: &str) -> Result<Option<JobSet>> {
        let api: Api<JobSet> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(kube_err)
    }

    async fn get_leader_worker_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LeaderWorkerSet>> {
        let api: Api<LeaderWorkerSet> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(kube_err)
    }
}
