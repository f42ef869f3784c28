//! Slurm control for the scheduler plugin: placeholder job lifecycle and
//! the pod-to-job index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use slurm_bridge_domain::jobir::{parse_job_id, pod_job_id_label, JobIr};
use slurm_bridge_domain::placeholder::{pod_key, PlaceholderInfo};
use slurm_bridge_domain::{BridgeError, Result};
use slurm_bridge_slurm_client::types::{
    JobDescMsg, JobState, JobSubmitReq, Uint32NoVal, Uint64NoVal,
};
use slurm_bridge_slurm_client::{SlurmClient, SlurmError};

/// A placeholder job as the plugin sees it. `job_id == 0` means "no live
/// placeholder".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderJob {
    pub job_id: i32,
    /// Host-list expression; empty while the job is queued.
    pub nodes: String,
}

#[async_trait]
pub trait SlurmControl: Send + Sync {
    /// Delete the placeholder job named by the pod's label. No-op for a
    /// missing label or an already-gone job.
    async fn delete_job(&self, pod: &Pod) -> Result<()>;

    /// Invert adminComment pod lists across all live jobs.
    async fn get_jobs_for_pods(&self) -> Result<BTreeMap<String, PlaceholderJob>>;

    /// The pod's placeholder job; empty when the label is unset, the job is
    /// gone, or the job is CANCELLED/COMPLETED.
    async fn get_job(&self, pod: &Pod) -> Result<PlaceholderJob>;

    async fn submit_job(&self, pod: &Pod, ir: &JobIr) -> Result<i32>;

    async fn update_job(&self, pod: &Pod, ir: &JobIr) -> Result<i32>;
}

pub struct RealSlurmControl {
    client: SlurmClient,
    mcs_label: String,
    partition: String,
}

impl RealSlurmControl {
    pub fn new(client: SlurmClient, mcs_label: String, partition: String) -> Self {
        Self {
            client,
            mcs_label,
            partition,
        }
    }

    /// Build the submission body from the IR. Placeholders carry no
    /// payload: they exist only to obtain an exclusive node allocation.
    fn build_job_desc(&self, ir: &JobIr) -> JobDescMsg {
        let ph_info = PlaceholderInfo {
            pods: ir
                .pods
                .iter()
                .map(|p| {
                    pod_key(
                        p.metadata.namespace.as_deref().unwrap_or_default(),
                        p.metadata.name.as_deref().unwrap_or_default(),
                    )
                })
                .collect(),
        };
        let info = &ir.job_info;
        JobDescMsg {
            account: info.account.clone(),
            admin_comment: Some(ph_info.to_json()),
            constraints: info.constraints.clone(),
            cpus_per_task: info.cpu_per_task,
            current_working_directory: Some("/tmp".to_string()),
            environment: Some(vec![
                "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin".to_string(),
            ]),
            flags: Some(vec!["EXTERNAL_JOB".to_string()]),
            group_id: info.group_id.clone(),
            licenses: info.licenses.clone(),
            maximum_nodes: info.max_nodes,
            mcs_label: Some(self.mcs_label.clone()),
            memory_per_node: Some(match info.mem_per_node {
                Some(mem) => Uint64NoVal::some(mem),
                None => Uint64NoVal::unset(),
            }),
            minimum_nodes: info.min_nodes,
            name: info.job_name.clone(),
            partition: Some(
                info.partition
                    .clone()
                    .unwrap_or_else(|| self.partition.clone()),
            ),
            qos: info.qos.clone(),
            reservation: info.reservation.clone(),
            // Shared none is effectively exclusive.
            shared: Some(vec!["none".to_string()]),
            tasks_per_node: info.tasks_per_node,
            time_limit: Some(match info.time_limit {
                Some(limit) => Uint32NoVal::some(limit.into()),
                None => Uint32NoVal::unset(),
            }),
            user_id: info.user_id.clone(),
            wckey: info.wckey.clone(),
        }
    }
}

fn slurm_err(err: SlurmError) -> BridgeError {
    BridgeError::Slurm(err.to_string())
}

// A CANCELLED or COMPLETED job no longer holds an allocation; it reads as
// "no placeholder" so the next cycle starts over.
fn placeholder_from(job_id: i32, job: slurm_bridge_slurm_client::types::JobInfo) -> PlaceholderJob {
    if job.has_any_state(&[JobState::Cancelled, JobState::Completed]) {
        return PlaceholderJob::default();
    }
    PlaceholderJob {
        job_id: job.job_id.unwrap_or(job_id),
        nodes: job.nodes.unwrap_or_default(),
    }
}

#[async_trait]
impl SlurmControl for RealSlurmControl {
    async fn delete_job(&self, pod: &Pod) -> Result<()> {
        let job_id = parse_job_id(pod_job_id_label(pod));
        if job_id == 0 {
            return Ok(());
        }
        match self.client.delete_job(job_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => Ok(()),
            Err(e) => Err(slurm_err(e)),
        }
    }

    async fn get_jobs_for_pods(&self) -> Result<BTreeMap<String, PlaceholderJob>> {
        let jobs = self.client.list_jobs().await.map_err(slurm_err)?;
        let mut pod_to_job = BTreeMap::new();
        for job in jobs {
            let Ok(info) = PlaceholderInfo::parse(job.admin_comment.as_deref()) else {
                // Not a placeholder job.
                continue;
            };
            for pod in info.pods {
                pod_to_job.insert(
                    pod,
                    PlaceholderJob {
                        job_id: job.job_id.unwrap_or_default(),
                        nodes: job.nodes.clone().unwrap_or_default(),
                    },
                );
            }
        }
        Ok(pod_to_job)
    }

    async fn get_job(&self, pod: &Pod) -> Result<PlaceholderJob> {
        let job_id = parse_job_id(pod_job_id_label(pod));
        if job_id == 0 {
            return Ok(PlaceholderJob::default());
        }
        let job = match self.client.get_job(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_benign() => return Ok(PlaceholderJob::default()),
            Err(e) => return Err(slurm_err(e)),
        };
        debug!(job_id, "found matching placeholder job");
        Ok(placeholder_from(job_id, job))
    }

    async fn submit_job(&self, _pod: &Pod, ir: &JobIr) -> Result<i32> {
        let req = JobSubmitReq {
            job: self.build_job_desc(ir),
        };
        self.client.submit_job(&req).await.map_err(slurm_err)
    }

    async fn update_job(&self, pod: &Pod, ir: &JobIr) -> Result<i32> {
        let job_id = parse_job_id(pod_job_id_label(pod));
        let desc = self.build_job_desc(ir);
        self.client
            .update_job(job_id, &desc)
            .await
            .map_err(slurm_err)?;
        Ok(job_id)
    }
}
