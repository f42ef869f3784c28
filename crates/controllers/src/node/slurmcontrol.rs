//! Slurm control for the node reconciler.
//!
//! Drain and undrain are idempotent state toggles. Undrain only touches
//! drains this system authored, detected by the reason prefix; drains set
//! by operators or other tooling are left alone.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node as KubeNode;
use tracing::{debug, info};

use slurm_bridge_domain::{nodemap, wellknown, BridgeError, Result};
use slurm_bridge_slurm_client::types::{NodeState, UpdateNodeMsg};
use slurm_bridge_slurm_client::{SlurmClient, SlurmError};

#[async_trait]
pub trait NodeSlurmControl: Send + Sync {
    async fn get_node_names(&self) -> Result<Vec<String>>;
    async fn make_node_drain(&self, node: &KubeNode, reason: &str) -> Result<()>;
    async fn make_node_undrain(&self, node: &KubeNode, reason: &str) -> Result<()>;
    async fn is_node_drain(&self, node: &KubeNode) -> Result<bool>;
}

pub struct RealNodeSlurmControl {
    client: SlurmClient,
}

impl RealNodeSlurmControl {
    pub fn new(client: SlurmClient) -> Self {
        Self { client }
    }
}

fn slurm_err(err: SlurmError) -> BridgeError {
    BridgeError::Slurm(err.to_string())
}

fn authored_reason(reason: &str) -> String {
    format!("{} {}", wellknown::NODE_REASON_PREFIX, reason)
}

/// Undrain only applies to nodes currently draining because of us. Drains
/// set by operators or other tooling keep their reason and state.
fn should_undrain(node: &slurm_bridge_slurm_client::types::Node) -> bool {
    if !node.has_state(NodeState::Drain) || node.has_state(NodeState::Undrain) {
        return false;
    }
    let reason = node.reason.as_deref().unwrap_or_default();
    reason.is_empty() || reason.contains(wellknown::NODE_REASON_PREFIX)
}

#[async_trait]
impl NodeSlurmControl for RealNodeSlurmControl {
    async fn get_node_names(&self) -> Result<Vec<String>> {
        let nodes = self.client.list_nodes().await.map_err(slurm_err)?;
        Ok(nodes.into_iter().filter_map(|n| n.name).collect())
    }

    async fn make_node_drain(&self, node: &KubeNode, reason: &str) -> Result<()> {
        let name = nodemap::slurm_node_name(node);
        let slurm_node = match self.client.get_node(&name).await {
            Ok(node) => node,
            Err(e) if e.is_benign() => return Ok(()),
            Err(e) => return Err(slurm_err(e)),
        };

        if slurm_node.has_state(NodeState::Drain) {
            debug!(node = %name, "node is already drained, skipping drain request");
            return Ok(());
        }

        info!(node = %name, "draining slurm node");
        let msg = UpdateNodeMsg {
            state: Some(vec![NodeState::Drain]),
            reason: Some(authored_reason(reason)),
        };
        match self.client.update_node(&name, &msg).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => Ok(()),
            Err(e) => Err(slurm_err(e)),
        }
    }

    async fn make_node_undrain(&self, node: &KubeNode, reason: &str) -> Result<()> {
        let name = nodemap::slurm_node_name(node);
        let slurm_node = match self.client.get_node(&name).await {
            Ok(node) => node,
            Err(e) if e.is_benign() => return Ok(()),
            Err(e) => return Err(slurm_err(e)),
        };

        if !should_undrain(&slurm_node) {
            debug!(node = %name, reason = slurm_node.reason.as_deref().unwrap_or_default(),
                "skipping undrain request");
            return Ok(());
        }

        info!(node = %name, "undraining slurm node");
        let msg = UpdateNodeMsg {
            state: Some(vec![NodeState::Undrain]),
            reason: Some(authored_reason(reason)),
        };
        match self.client.update_node(&name, &msg).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => Ok(()),
            Err(e) => Err(slurm_err(e)),
        }
    }

    async fn is_node_drain(&self, node: &KubeNode) -> Result<bool> {
        let name = nodemap::slurm_node_name(node);
        let slurm_node = self.client.get_node(&name).await.map_err(slurm_err)?;
        Ok(slurm_node.has_state(NodeState::Drain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slurm_bridge_slurm_client::types::Node as SlurmNode;

    fn node(states: &[NodeState], reason: Option<&str>) -> SlurmNode {
        SlurmNode {
            name: Some("n1".into()),
            state: states.to_vec(),
            reason: reason.map(|r| r.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn reasons_carry_the_bridge_prefix() {
        assert_eq!(
            authored_reason("Corresponding Kubernetes node (n1) is unschedulable"),
            "slurm-bridge: Corresponding Kubernetes node (n1) is unschedulable"
        );
    }

    #[test]
    fn undrains_only_bridge_authored_drains() {
        assert!(should_undrain(&node(
            &[NodeState::Idle, NodeState::Drain],
            Some("slurm-bridge: Corresponding Kubernetes node (n1) is unschedulable"),
        )));
        // Foreign drains are left untouched.
        assert!(!should_undrain(&node(
            &[NodeState::Idle, NodeState::Drain],
            Some("maintenance window"),
        )));
    }

    #[test]
    fn undrain_is_a_noop_without_drain_state() {
        assert!(!should_undrain(&node(&[NodeState::Idle], None)));
        assert!(!should_undrain(&node(
            &[NodeState::Drain, NodeState::Undrain],
            Some("slurm-bridge: x"),
        )));
    }

    #[test]
    fn drain_without_reason_may_be_undrained() {
        assert!(should_undrain(&node(&[NodeState::Drain], None)));
    }
}
