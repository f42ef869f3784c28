//! Node reconcile subroutines.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use slurm_bridge_cluster::NodeApi;
use slurm_bridge_domain::{nodemap, taints, BridgeError, Result};

use super::slurmcontrol::NodeSlurmControl;

pub struct NodeReconciler {
    nodes: Arc<dyn NodeApi>,
    slurm: Arc<dyn NodeSlurmControl>,
    scheduler_name: String,
}

impl NodeReconciler {
    pub fn new(
        nodes: Arc<dyn NodeApi>,
        slurm: Arc<dyn NodeSlurmControl>,
        scheduler_name: String,
    ) -> Self {
        Self {
            nodes,
            slurm,
            scheduler_name,
        }
    }

    pub async fn sync(&self, name: &str) -> Result<()> {
        let mut errs = Vec::new();
        if let Err(e) = self.sync_taint(name).await {
            errs.push(e);
        }
        if let Err(e) = self.sync_state(name).await {
            errs.push(e);
        }
        BridgeError::aggregate(errs)
    }

    /// Apply the bridged taint to nodes shared with Slurm and remove it
    /// from nodes that no longer are.
    async fn sync_taint(&self, name: &str) -> Result<()> {
        let Some(node) = self.nodes.get(name).await? else {
            return Ok(());
        };

        let slurm_names: BTreeSet<String> =
            self.slurm.get_node_names().await?.into_iter().collect();
        let kube_nodes = self.nodes.list().await?;
        let name_map = nodemap::make_node_name_map(&kube_nodes);
        let bridged: BTreeSet<String> = slurm_names
            .into_iter()
            .filter(|n| name_map.contains_key(n))
            .collect();

        let slurm_name = nodemap::slurm_node_name(&node);
        let current = node.spec.as_ref().and_then(|s| s.taints.clone()).unwrap_or_default();

        if bridged.contains(&slurm_name) {
            if taints::has_bridged_taint(&current, &self.scheduler_name) {
                debug!(node = name, "bridged taint already present");
                return Ok(());
            }
            info!(node = name, "adding taint to bridged node");
            let mut desired = taints::remove_bridged_taint(current);
            desired.push(taints::new_taint_node_bridged(&self.scheduler_name));
            self.nodes
                .apply_patch(name, json!({ "spec": { "taints": desired } }))
                .await
        } else {
            let desired = taints::remove_bridged_taint(current.clone());
            if desired.len() == current.len() {
                debug!(node = name, "no bridged taint to remove");
                return Ok(());
            }
            info!(node = name, "removing taint from non-bridged node");
            self.nodes
                .apply_patch(name, json!({ "spec": { "taints": desired } }))
                .await
        }
    }

    /// Propagate cordon state into Slurm. Slurm is the scheduling
    /// authority, so only Kubernetes-to-Slurm direction applies, and only
    /// for states that inhibit scheduling.
    async fn sync_state(&self, name: &str) -> Result<()> {
        let Some(node) = self.nodes.get(name).await? else {
            return Ok(());
        };

        let unschedulable = node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false);
        if unschedulable {
            let reason = format!("Corresponding Kubernetes node ({name}) is unschedulable");
            debug!(node = name, "draining slurm node, kubernetes node is unschedulable");
            self.slurm.make_node_drain(&node, &reason).await
        } else {
            let reason = format!("Corresponding Kubernetes node ({name}) is schedulable");
            debug!(node = name, "undraining slurm node, kubernetes node is schedulable");
            self.slurm.make_node_undrain(&node, &reason).await
        }
    }
}
