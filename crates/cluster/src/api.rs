//! Trait seams over the Kubernetes API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};

use slurm_bridge_domain::Result;

use crate::crds::{JobSet, LeaderWorkerSet, PodGroup};

/// Partial metadata of a workload object, enough to continue an owner walk
/// and to read job attribute annotations off the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerMeta {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// The `controller=true` owner reference, when one exists.
    pub controller_owner: Option<OwnerRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// Extract the controller owner reference from object metadata.
pub fn controller_owner(
    meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
) -> Option<OwnerRef> {
    meta.owner_references.as_ref().and_then(|owners| {
        owners
            .iter()
            .find(|o| o.controller.unwrap_or(false))
            .map(|o| OwnerRef {
                api_version: o.api_version.clone(),
                kind: o.kind.clone(),
                name: o.name.clone(),
            })
    })
}

#[async_trait]
pub trait PodApi: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// Cluster-wide list of pods carrying `key=value`.
    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<Pod>>;

    /// Pods requesting this scheduler that have no node assigned yet.
    async fn list_pending_for_scheduler(&self, scheduler_name: &str) -> Result<Vec<Pod>>;

    /// Merge-patch against the observed version; maps merge per key with
    /// null deleting, arrays are written whole.
    async fn apply_patch(&self, namespace: &str, name: &str, patch: serde_json::Value)
        -> Result<()>;

    /// Delete is idempotent; an already-gone pod is success.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Bind the pod to a node through the binding subresource.
    async fn bind(&self, namespace: &str, name: &str, node: &str) -> Result<()>;
}

#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Node>>;
    async fn list(&self) -> Result<Vec<Node>>;
    async fn apply_patch(&self, name: &str, patch: serde_json::Value) -> Result<()>;
}

#[async_trait]
pub trait NamespaceApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Namespace>>;
}

/// Workload reads for the owner walk and the per-kind IR translation.
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// Fetch an owner as partial metadata. Unknown kinds and missing
    /// objects both yield None, terminating the walk.
    async fn get_owner_metadata(
        &self,
        namespace: &str,
        api_version: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<OwnerMeta>>;

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;
    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<Option<PodGroup>>;
    async fn get_job_set(&self, namespace: &str, name: &str) -> Result<Option<JobSet>>;
    async fn get_leader_worker_set(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<LeaderWorkerSet>>;
}
