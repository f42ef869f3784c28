//! Scheduling-cycle driver.
//!
//! Stands in for the host scheduling framework: finds pods that name this
//! scheduler and have no node, runs pre-filter, confirms the candidate with
//! the filter hook and binds. Pending and Error outcomes simply leave the
//! pod for the next cycle; the plugin never blocks on Slurm.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use slurm_bridge_cluster::PodApi;
use slurm_bridge_domain::placeholder::pod_key;

use crate::framework::{Code, FilterPlugin, PreFilterPlugin};
use crate::plugin::SlurmBridge;

pub struct SchedulerRunner {
    plugin: Arc<SlurmBridge>,
    pods: Arc<dyn PodApi>,
    scheduler_name: String,
    interval: Duration,
}

impl SchedulerRunner {
    pub fn new(
        plugin: Arc<SlurmBridge>,
        pods: Arc<dyn PodApi>,
        scheduler_name: String,
        interval: Duration,
    ) -> Self {
        Self {
            plugin,
            pods,
            scheduler_name,
            interval,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("scheduler runner shutting down");
                    return;
                }
                _ = tick.tick() => {}
            }
            let pending = match self.pods.list_pending_for_scheduler(&self.scheduler_name).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(error = %e, "failed to list pending pods");
                    continue;
                }
            };
            for pod in &pending {
                self.schedule_one(pod).await;
            }
        }
    }

    pub async fn schedule_one(&self, pod: &Pod) {
        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        let key = pod_key(namespace, name);

        let (result, status) = self.plugin.pre_filter(pod).await;
        match status.code() {
            Code::Success => {}
            Code::Pending => {
                debug!(pod = %key, reason = %status.message(), "placement pending");
                return;
            }
            Code::UnschedulableAndUnresolvable | Code::Unschedulable => {
                warn!(pod = %key, reason = %status.message(), "pod is unschedulable");
                return;
            }
            Code::Error => {
                warn!(pod = %key, reason = %status.message(), "scheduling cycle failed");
                return;
            }
        }
        let Some(result) = result else { return };

        // Pre-filter patched annotations; bind against the fresh pod.
        let fresh = match self.pods.get(namespace, name).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => return,
            Err(e) => {
                warn!(pod = %key, error = %e, "failed to re-read pod before binding");
                return;
            }
        };

        for node in &result.node_names {
            let filter = self.plugin.filter(&fresh, node).await;
            if !filter.is_success() {
                debug!(pod = %key, node = %node, reason = %filter.message(), "node filtered out");
                continue;
            }
            match self.pods.bind(namespace, name, node).await {
                Ok(()) => {
                    info!(pod = %key, node = %node, "bound pod to slurm-allocated node");
                    return;
                }
                Err(e) => {
                    warn!(pod = %key, node = %node, error = %e, "failed to bind pod");
                    return;
                }
            }
        }
        warn!(pod = %key, "no allocated node passed the filter");
    }
}
