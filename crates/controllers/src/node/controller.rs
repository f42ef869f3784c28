//! Node controller: work queue, workers and Slurm node event filtering.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Node as KubeNode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use slurm_bridge_cluster::NodeApi;
use slurm_bridge_domain::nodemap;
use slurm_bridge_slurm_client::NodeEvent;

use super::sync::NodeReconciler;
use crate::backoff::Backoff;
use crate::queue::KeyedQueue;

pub struct NodeController {
    reconciler: Arc<NodeReconciler>,
    nodes: Arc<dyn NodeApi>,
    queue: KeyedQueue<String>,
    backoff: Arc<Backoff>,
    concurrency: usize,
}

impl NodeController {
    pub fn new(
        reconciler: Arc<NodeReconciler>,
        nodes: Arc<dyn NodeApi>,
        concurrency: usize,
    ) -> Self {
        Self {
            reconciler,
            nodes,
            queue: KeyedQueue::new(),
            backoff: Arc::new(Backoff::for_reconciler()),
            concurrency: concurrency.max(1),
        }
    }

    pub fn enqueue_node(&self, node: &KubeNode) {
        if let Some(name) = node.metadata.name.as_deref() {
            self.queue.add(name.to_string());
        }
    }

    /// Slurm node events enqueue the corresponding Kubernetes node.
    /// Add/delete forward unconditionally; updates only when the address
    /// or hostname changed.
    pub async fn handle_node_event(&self, event: NodeEvent) {
        let slurm_node = match &event {
            NodeEvent::Added(node) | NodeEvent::Deleted(node) => node.clone(),
            NodeEvent::Updated { old, new } => {
                if old.address == new.address && old.hostname == new.hostname {
                    return;
                }
                new.clone()
            }
        };
        let Some(name) = slurm_node.name else { return };

        let kube_nodes = match self.nodes.list().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "failed to list nodes for slurm node event");
                return;
            }
        };
        let map = nodemap::make_node_name_map(&kube_nodes);
        self.queue.add(nodemap::to_kube_name(&map, &name));
    }

    pub async fn run(
        self: Arc<Self>,
        mut kube_events: mpsc::UnboundedReceiver<KubeNode>,
        mut slurm_events: mpsc::UnboundedReceiver<NodeEvent>,
        token: CancellationToken,
    ) {
        let backoff = self.backoff.clone();
        let gc_token = token.clone();
        tokio::spawn(async move { backoff.run_gc(gc_token).await });

        for worker in 0..self.concurrency {
            let controller = self.clone();
            let token = token.clone();
            tokio::spawn(async move {
                controller.worker(worker, token).await;
            });
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("node controller shutting down");
                    return;
                }
                Some(node) = kube_events.recv() => self.enqueue_node(&node),
                Some(event) = slurm_events.recv() => self.handle_node_event(event).await,
                else => return,
            }
        }
    }

    async fn worker(&self, worker: usize, token: CancellationToken) {
        loop {
            let key = tokio::select! {
                _ = token.cancelled() => return,
                key = self.queue.next() => key,
            };
            debug!(worker, node = %key, "started syncing node");
            match self.reconciler.sync(&key).await {
                Ok(()) => {
                    self.backoff.reset(&key);
                    self.queue.done(&key);
                }
                Err(e) => {
                    let delay = self.backoff.next(&key);
                    warn!(node = %key, error = %e, requeue_after = ?delay, "node sync failed");
                    self.queue.done(&key);
                    self.queue.add_after(key, delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use slurm_bridge_cluster::MemoryCluster;
    use slurm_bridge_domain::{wellknown, Result};
    use slurm_bridge_slurm_client::types::Node as SlurmNode;

    use crate::node::slurmcontrol::NodeSlurmControl;

    #[derive(Default)]
    struct NoopNodeSlurm {
        _names: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NodeSlurmControl for NoopNodeSlurm {
        async fn get_node_names(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn make_node_drain(&self, _node: &KubeNode, _reason: &str) -> Result<()> {
            Ok(())
        }
        async fn make_node_undrain(&self, _node: &KubeNode, _reason: &str) -> Result<()> {
            Ok(())
        }
        async fn is_node_drain(&self, _node: &KubeNode) -> Result<bool> {
            Ok(false)
        }
    }

    fn controller(cluster: &MemoryCluster) -> NodeController {
        let reconciler = Arc::new(NodeReconciler::new(
            Arc::new(cluster.clone()),
            Arc::new(NoopNodeSlurm::default()),
            "slurm-bridge-scheduler".into(),
        ));
        NodeController::new(reconciler, Arc::new(cluster.clone()), 1)
    }

    fn slurm_node(name: &str, address: &str) -> SlurmNode {
        SlurmNode {
            name: Some(name.into()),
            address: Some(address.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_and_delete_events_enqueue() {
        let cluster = MemoryCluster::new();
        let c = controller(&cluster);

        c.handle_node_event(NodeEvent::Added(slurm_node("n1", "10.0.0.1")))
            .await;
        assert_eq!(c.queue.len(), 1);
    }

    #[tokio::test]
    async fn update_without_address_change_is_dropped() {
        let cluster = MemoryCluster::new();
        let c = controller(&cluster);

        let mut changed_state = slurm_node("n1", "10.0.0.1");
        changed_state.reason = Some("maintenance".into());
        c.handle_node_event(NodeEvent::Updated {
            old: slurm_node("n1", "10.0.0.1"),
            new: changed_state,
        })
        .await;
        assert_eq!(c.queue.len(), 0);

        c.handle_node_event(NodeEvent::Updated {
            old: slurm_node("n1", "10.0.0.1"),
            new: slurm_node("n1", "10.0.0.9"),
        })
        .await;
        assert_eq!(c.queue.len(), 1);
    }

    #[tokio::test]
    async fn events_resolve_through_the_name_map() {
        let cluster = MemoryCluster::new();
        cluster.add_node(KubeNode {
            metadata: ObjectMeta {
                name: Some("kube-1".into()),
                labels: Some(
                    [(
                        wellknown::LABEL_SLURM_NODE_NAME.to_string(),
                        "slurm-1".to_string(),
                    )]
                    .into(),
                ),
                ..Default::default()
            },
            ..Default::default()
        });
        let c = controller(&cluster);

        c.handle_node_event(NodeEvent::Added(slurm_node("slurm-1", "10.0.0.1")))
            .await;
        assert_eq!(c.queue.len(), 1);
        let key = c.queue.next().await;
        assert_eq!(key, "kube-1");
    }
}
