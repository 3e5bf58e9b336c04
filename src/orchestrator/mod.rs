//! Orchestrator external collaborator, shaped after a Nomad-style job API:
//! jobs contain task groups of tasks, each task carries an image reference
//! inside its driver config.

mod jobspec;
mod nomad;

pub use jobspec::apply_tag_update;
pub use nomad::NomadOrchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub image: String,
    #[serde(default)]
    pub force_pull: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub config: TaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub name: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub task_groups: Vec<TaskGroup>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub vault_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegisterResult {
    pub evaluation_id: String,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub deployment_id: Option<String>,
    pub status: String,
    pub status_description: String,
}

#[derive(Debug, Clone)]
pub struct Deployment {
    pub status: String,
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<Job>;
    async fn register_job(&self, job: &Job) -> Result<RegisterResult>;
    async fn get_evaluation(&self, evaluation_id: &str) -> Result<Evaluation>;
    async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment>;
}
