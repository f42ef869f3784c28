//! Slurm control for the pod reconciler.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use tracing::warn;

use slurm_bridge_domain::jobir::{parse_job_id, pod_job_id_label};
use slurm_bridge_domain::{BridgeError, Result};
use slurm_bridge_slurm_client::types::JobState;
use slurm_bridge_slurm_client::{SlurmClient, SlurmError};

#[async_trait]
pub trait PodSlurmControl: Send + Sync {
    /// Whether the pod's placeholder job is in RUNNING state. A missing
    /// label or job counts as not running.
    async fn is_job_running(&self, pod: &Pod) -> Result<bool>;

    /// Cancel the job by id. Non-existent jobs are a no-op.
    async fn terminate_job(&self, job_id: i32) -> Result<()>;
}

pub struct RealPodSlurmControl {
    client: SlurmClient,
}

impl RealPodSlurmControl {
    pub fn new(client: SlurmClient) -> Self {
        Self { client }
    }
}

fn slurm_err(err: SlurmError) -> BridgeError {
    BridgeError::Slurm(err.to_string())
}

#[async_trait]
impl PodSlurmControl for RealPodSlurmControl {
    async fn is_job_running(&self, pod: &Pod) -> Result<bool> {
        let job_id = parse_job_id(pod_job_id_label(pod));
        if job_id == 0 {
            return Ok(false);
        }
        let job = match self.client.get_job(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_benign() => return Ok(false),
            Err(e) => {
                warn!(job_id, error = %e, "failed to fetch slurm job");
                return Err(slurm_err(e));
            }
        };
        Ok(job.has_any_state(&[JobState::Running]))
    }

    async fn terminate_job(&self, job_id: i32) -> Result<()> {
        if job_id == 0 {
            return Ok(());
        }
        match self.client.delete_job(job_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign() => Ok(()),
            Err(e) => Err(slurm_err(e)),
        }
    }
}
