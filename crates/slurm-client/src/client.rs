//! HTTP client for slurmrestd.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::SlurmError;
use crate::types::{
    ApiResponse, JobDescMsg, JobInfo, JobSubmitReq, JobSubmitResponse, JobsResponse, Node,
    NodesResponse, UpdateNodeMsg,
};

const API_PREFIX: &str = "slurm/v0.0.43";
const AUTH_HEADER: &str = "X-SLURM-USER-TOKEN";

#[derive(Debug, Clone, Default)]
pub struct SlurmClientConfig {
    /// Base URL of slurmrestd, e.g. `http://slurm-restd:6820`.
    pub server: String,
    /// JWT bearer token, typically from `SLURM_JWT`.
    pub auth_token: String,
}

#[derive(Debug, Clone)]
pub struct SlurmClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl SlurmClient {
    pub fn new(config: &SlurmClientConfig) -> Result<Self, SlurmError> {
        let base = Url::parse(&config.server)
            .map_err(|e| SlurmError::InvalidUrl(format!("{}: {e}", config.server)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: config.auth_token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, SlurmError> {
        let url = self
            .base
            .join(&format!("{API_PREFIX}/{path}"))
            .map_err(|e| SlurmError::InvalidUrl(e.to_string()))?;
        Ok(self.http.request(method, url).header(AUTH_HEADER, &self.token))
    }

    async fn check(&self, response: Response) -> Result<Response, SlurmError> {
        match response.status() {
            StatusCode::NOT_FOUND => Err(SlurmError::NotFound),
            StatusCode::NO_CONTENT => Err(SlurmError::NoContent),
            status if status.is_success() => Ok(response),
            status => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiResponse>(&body)
                    .ok()
                    .and_then(|r| r.errors.first().map(|e| e.message()))
                    .unwrap_or(body);
                Err(SlurmError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, SlurmError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SlurmError::Decode(e.to_string()))
    }

    /// Fetch one job. Missing jobs are `NotFound`.
    pub async fn get_job(&self, job_id: i32) -> Result<JobInfo, SlurmError> {
        let response = self.request(Method::GET, &format!("job/{job_id}"))?.send().await?;
        let response = self.check(response).await?;
        let jobs: JobsResponse = self.decode(response).await?;
        jobs.jobs.into_iter().next().ok_or(SlurmError::NotFound)
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobInfo>, SlurmError> {
        let response = self.request(Method::GET, "jobs")?.send().await?;
        let response = self.check(response).await?;
        let jobs: JobsResponse = self.decode(response).await?;
        Ok(jobs.jobs)
    }

    /// Submit a job and return its id. Errors reported in the response body
    /// are surfaced even on 2xx, as slurmrestd does.
    pub async fn submit_job(&self, req: &JobSubmitReq) -> Result<i32, SlurmError> {
        let response = self
            .request(Method::POST, "job/submit")?
            .json(req)
            .send()
            .await?;
        let response = self.check(response).await?;
        let submit: JobSubmitResponse = self.decode(response).await?;
        if let Some(err) = submit.errors.first() {
            return Err(SlurmError::Api {
                status: 200,
                message: err.message(),
            });
        }
        submit
            .job_id
            .ok_or_else(|| SlurmError::Decode("submit response without job_id".to_string()))
    }

    pub async fn update_job(&self, job_id: i32, desc: &JobDescMsg) -> Result<(), SlurmError> {
        debug!(job_id, "updating slurm job");
        let response = self
            .request(Method::POST, &format!("job/{job_id}"))?
            .json(desc)
            .send()
            .await?;
        let response = self.check(response).await?;
        let api: ApiResponse = self.decode(response).await.unwrap_or_default();
        if let Some(err) = api.errors.first() {
            return Err(SlurmError::Api {
                status: 200,
                message: err.message(),
            });
        }
        Ok(())
    }

    /// Cancel a job. Callers decide whether `NotFound` matters.
    pub async fn delete_job(&self, job_id: i32) -> Result<(), SlurmError> {
        debug!(job_id, "deleting slurm job");
        let response = self
            .request(Method::DELETE, &format!("job/{job_id}"))?
            .send()
            .await?;
        self.check(response).await.map(|_| ())
    }

    pub async fn get_node(&self, name: &str) -> Result<Node, SlurmError> {
        let response = self.request(Method::GET, &format!("node/{name}"))?.send().await?;
        let response = self.check(response).await?;
        let nodes: NodesResponse = self.decode(response).await?;
        nodes.nodes.into_iter().next().ok_or(SlurmError::NotFound)
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, SlurmError> {
        let response = self.request(Method::GET, "nodes")?.send().await?;
        let response = self.check(response).await?;
        let nodes: NodesResponse = self.decode(response).await?;
        Ok(nodes.nodes)
    }

    pub async fn update_node(&self, name: &str, msg: &UpdateNodeMsg) -> Result<(), SlurmError> {
        debug!(node = name, "updating slurm node");
        let response = self
            .request(Method::POST, &format!("node/{name}"))?
            .json(msg)
            .send()
            .await?;
        self.check(response).await.map(|_| ())
    }
}
