//! Pod controller: work queue, workers and event sourcing.
//!
//! Reconcile requests come from two directions: the Kubernetes pod watch,
//! and synthetic events derived from Slurm job changes. A job add/delete
//! whose placeholder has no surviving pods terminates the job directly.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use slurm_bridge_cluster::PodApi;
use slurm_bridge_domain::placeholder::{pod_key, PlaceholderInfo};
use slurm_bridge_domain::wellknown;
use slurm_bridge_slurm_client::types::JobInfo;
use slurm_bridge_slurm_client::JobEvent;

use super::slurmcontrol::PodSlurmControl;
use super::sync::PodReconciler;
use crate::backoff::Backoff;
use crate::queue::KeyedQueue;

pub struct PodController {
    reconciler: Arc<PodReconciler>,
    pods: Arc<dyn PodApi>,
    slurm: Arc<dyn PodSlurmControl>,
    scheduler_name: String,
    queue: KeyedQueue<String>,
    backoff: Arc<Backoff>,
    concurrency: usize,
}

impl PodController {
    pub fn new(
        reconciler: Arc<PodReconciler>,
        pods: Arc<dyn PodApi>,
        slurm: Arc<dyn PodSlurmControl>,
        scheduler_name: String,
        concurrency: usize,
    ) -> Self {
        Self {
            reconciler,
            pods,
            slurm,
            scheduler_name,
            queue: KeyedQueue::new(),
            backoff: Arc::new(Backoff::for_reconciler()),
            concurrency: concurrency.max(1),
        }
    }

    /// Enqueue a pod seen on the Kubernetes watch. Only bridge-scheduled
    /// pods are managed.
    pub fn enqueue_pod(&self, pod: &Pod) {
        let managed = pod
            .spec
            .as_ref()
            .and_then(|s| s.scheduler_name.as_deref())
            == Some(self.scheduler_name.as_str());
        if !managed {
            return;
        }
        self.queue.add(pod_key(
            pod.metadata.namespace.as_deref().unwrap_or_default(),
            pod.metadata.name.as_deref().unwrap_or_default(),
        ));
    }

    /// Translate a Slurm job event into pod reconcile requests. Events for
    /// jobs without a parseable placeholder payload are not ours.
    pub async fn handle_job_event(&self, event: JobEvent) {
        match event {
            JobEvent::Added(job) | JobEvent::Deleted(job) => {
                if !is_placeholder(&job) {
                    return;
                }
                self.fan_out(&job, true).await;
            }
            JobEvent::Updated { old, new } => {
                if !is_placeholder(&new) {
                    return;
                }
                if old.job_state != new.job_state {
                    self.fan_out(&new, false).await;
                }
            }
        }
    }

    async fn fan_out(&self, job: &JobInfo, terminate_if_orphaned: bool) {
        let job_id = job.job_id.unwrap_or_default();
        let pods = match self
            .pods
            .list_by_label(wellknown::LABEL_PLACEHOLDER_JOB_ID, &job_id.to_string())
            .await
        {
            Ok(pods) => pods,
            Err(e) => {
                warn!(job_id, error = %e, "failed to list pods for job event");
                return;
            }
        };
        debug!(job_id, requests = pods.len(), "generating pod reconcile requests");
        for pod in &pods {
            self.queue.add(pod_key(
                pod.metadata.namespace.as_deref().unwrap_or_default(),
                pod.metadata.name.as_deref().unwrap_or_default(),
            ));
        }
        if terminate_if_orphaned && pods.is_empty() {
            info!(job_id, "terminating slurm job, its pods were deleted");
            if let Err(e) = self.slurm.terminate_job(job_id).await {
                warn!(job_id, error = %e, "failed to terminate orphaned slurm job");
            }
        }
    }

    /// Run workers and event pumps until cancelled.
    pub async fn run(
        self: Arc<Self>,
        mut pod_events: mpsc::UnboundedReceiver<Pod>,
        mut job_events: mpsc::UnboundedReceiver<JobEvent>,
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
                    debug!("pod controller shutting down");
                    return;
                }
                Some(pod) = pod_events.recv() => self.enqueue_pod(&pod),
                Some(event) = job_events.recv() => self.handle_job_event(event).await,
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
            debug!(worker, pod = %key, "started syncing pod");
            match self.reconciler.sync(&key).await {
                Ok(()) => {
                    self.backoff.reset(&key);
                    self.queue.done(&key);
                }
                Err(e) => {
                    let delay = self.backoff.next(&key);
                    warn!(pod = %key, error = %e, requeue_after = ?delay, "pod sync failed");
                    self.queue.done(&key);
                    self.queue.add_after(key, delay);
                }
            }
        }
    }
}

fn is_placeholder(job: &JobInfo) -> bool {
    PlaceholderInfo::parse(job.admin_comment.as_deref()).is_ok()
}
