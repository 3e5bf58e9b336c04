use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, WatcherError};

use super::{Deployment, Evaluation, Job, Orchestrator, RegisterResult};

/// Talks to a Nomad-shaped HTTP API: `GET /v1/job/:id`,
/// `POST /v1/job/:id`, `GET /v1/evaluation/:id`, `GET /v1/deployment/:id`.
pub struct NomadOrchestrator {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl NomadOrchestrator {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { base_url: base_url.into(), token, client })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.header("X-Nomad-Token", token);
        }
        req
    }

    fn transient(source: impl std::error::Error + Send + Sync + 'static) -> WatcherError {
        WatcherError::TransientExternal { system: "orchestrator", source: source.into() }
    }
}

#[derive(Deserialize)]
struct RegisterResponse {
    #[serde(rename = "EvalID")]
    eval_id: String,
}

#[derive(Deserialize)]
struct EvaluationResponse {
    #[serde(rename = "DeploymentID")]
    deployment_id: Option<String>,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "StatusDescription")]
    status_description: String,
}

#[derive(Deserialize)]
struct DeploymentResponse {
    #[serde(rename = "Status")]
    status: String,
}

#[async_trait]
impl Orchestrator for NomadOrchestrator {
    async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.request(reqwest::Method::GET, &format!("/v1/job/{job_id}"))
            .send()
            .await
            .map_err(Self::transient)?
            .error_for_status()
            .map_err(Self::transient)?
            .json::<Job>()
            .await
            .map_err(Self::transient)
    }

    async fn register_job(&self, job: &Job) -> Result<RegisterResult> {
        let body = serde_json::json!({ "Job": job });
        let resp: RegisterResponse = self
            .request(reqwest::Method::POST, &format!("/v1/job/{}", job.id))
            .json(&body)
            .send()
            .await
            .map_err(Self::transient)?
            .error_for_status()
            .map_err(Self::transient)?
            .json()
            .await
            .map_err(Self::transient)?;
        Ok(RegisterResult { evaluation_id: resp.eval_id })
    }

    async fn get_evaluation(&self, evaluation_id: &str) -> Result<Evaluation> {
        let resp: EvaluationResponse = self
            .request(reqwest::Method::GET, &format!("/v1/evaluation/{evaluation_id}"))
            .send()
            .await
            .map_err(Self::transient)?
            .error_for_status()
            .map_err(Self::transient)?
            .json()
            .await
            .map_err(Self::transient)?;
        Ok(Evaluation {
            deployment_id: resp.deployment_id,
            status: resp.status,
            status_description: resp.status_description,
        })
    }

    async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment> {
        let resp: DeploymentResponse = self
            .request(reqwest::Method::GET, &format!("/v1/deployment/{deployment_id}"))
            .send()
            .await
            .map_err(Self::transient)?
            .error_for_status()
            .map_err(Self::transient)?
            .json()
            .await
            .map_err(Self::transient)?;
        Ok(Deployment { status: resp.status })
    }
}
