//! Slurm to Kubernetes node-name mapping.
//!
//! Nodes may carry an explicit mapping label; without it the Slurm name is
//! assumed to equal the Kubernetes name.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;

use crate::errors::{BridgeError, Result};
use crate::wellknown;

/// The Slurm node name for a Kubernetes node.
pub fn slurm_node_name(node: &Node) -> String {
    node.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(wellknown::LABEL_SLURM_NODE_NAME))
        .cloned()
        .unwrap_or_else(|| node.metadata.name.clone().unwrap_or_default())
}

/// Map from Slurm node name to Kubernetes node name over a node list.
pub fn make_node_name_map(nodes: &[Node]) -> BTreeMap<String, String> {
    nodes
        .iter()
        .map(|n| {
            (
                slurm_node_name(n),
                n.metadata.name.clone().unwrap_or_default(),
            )
        })
        .collect()
}

/// Reject node lists where two Kubernetes nodes map to the same Slurm name.
/// Run at startup; placement with an ambiguous mapping is undefined.
pub fn check_collisions(nodes: &[Node]) -> Result<()> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for node in nodes {
        let slurm = slurm_node_name(node);
        let kube = node.metadata.name.clone().unwrap_or_default();
        if let Some(first) = seen.get(&slurm) {
            return Err(BridgeError::NodeNameCollision {
                slurm_node: slurm,
                first: first.clone(),
                second: kube,
            });
        }
        seen.insert(slurm, kube);
    }
    Ok(())
}

/// Resolve a Slurm node name to a Kubernetes node name, assuming identity
/// when unmapped.
pub fn to_kube_name(map: &BTreeMap<String, String>, slurm_node: &str) -> String {
    map.get(slurm_node)
        .cloned()
        .unwrap_or_else(|| slurm_node.to_string())
}
