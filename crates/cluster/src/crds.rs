//! Custom resource types for the workload kinds the bridge understands
//! beyond core and batch: co-scheduled pod groups, job sets and
//! leader/worker sets. Only the fields the translator reads are modeled.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// PodGroup from the co-scheduling convention. The group does not own its
/// pods; membership is by label.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "scheduling.x-k8s.io",
    version = "v1alpha1",
    kind = "PodGroup",
    namespaced,
    status = "PodGroupStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupSpec {
    /// Minimum number of members required for the group to schedule.
    #[serde(default)]
    pub min_member: i32,
    /// Aggregate resource floor for the whole group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_resources: Option<BTreeMap<String, Quantity>>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupStatus {
    #[serde(default)]
    pub phase: PodGroupPhase,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, JsonSchema, Serialize, PartialEq, Eq)]
pub enum PodGroupPhase {
    #[default]
    Pending,
    PreScheduling,
    Scheduling,
    Scheduled,
    Running,
    Finished,
    Failed,
    Unknown,
}

/// JobSet: an indexed set of Jobs. Pods reach it through their child Job,
/// so the translator only needs its identity and replicated job names.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "jobset.x-k8s.io",
    version = "v1alpha2",
    kind = "JobSet",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct JobSetSpec {
    #[serde(default)]
    pub replicated_jobs: Vec<ReplicatedJob>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedJob {
    pub name: String,
    #[serde(default)]
    pub replicas: i32,
}

/// LeaderWorkerSet: one leader plus workers per replica group, co-placed as
/// a unit of `size` pods.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
#[kube(
    group = "leaderworkerset.x-k8s.io",
    version = "v1",
    kind = "LeaderWorkerSet",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LeaderWorkerSetSpec {
    #[serde(default)]
    pub leader_worker_template: LeaderWorkerTemplate,
    #[serde(default)]
    pub replicas: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderWorkerTemplate {
    /// Pods per replica group, leader included.
    #[serde(default)]
    pub size: Option<i32>,
}
