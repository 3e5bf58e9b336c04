//! Deployment monitor (C5): tracks a registered job's evaluation through to
//! a terminal deployment status, expressed as an explicit two-state
//! machine rather than nested polling loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::metrics;
use crate::notifications::{Notifier, Severity};
use crate::orchestrator::Orchestrator;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const OVERALL_TIMEOUT: Duration = Duration::from_secs(1_200);

pub type MonitorHandle = JoinHandle<()>;

enum MonitorState {
    EvalPending,
    DeployPending { deployment_id: String },
}

enum Outcome {
    Successful,
    Failed,
    Other(String),
}

/// Spawns the monitor as a short-lived task; the worker does not await it.
pub fn spawn_monitor(
    orchestrator: Arc<dyn Orchestrator>,
    notifier: Arc<dyn Notifier>,
    job_id: String,
    tag_to_deploy: String,
    evaluation_id: String,
) -> MonitorHandle {
    tokio::spawn(async move {
        let outcome = run(orchestrator.as_ref(), &evaluation_id).await;
        let (severity, text) = match outcome {
            Outcome::Successful => (
                Severity::Success,
                format!("Success: Nomad deployment for job `{job_id}` succeeded for tag `{tag_to_deploy}`"),
            ),
            Outcome::Failed => (
                Severity::Error,
                format!(
                    "Error: Nomad deployment job `{job_id}` failed for tag `{tag_to_deploy}`, \
                     nomad server will roll back to last working version if possible"
                ),
            ),
            Outcome::Other(status) => (
                Severity::Update,
                format!(
                    "Update: Nomad deployment status is `{status}` for job `{job_id}` for tag \
                     `{tag_to_deploy}`. Monitoring timeout"
                ),
            ),
        };
        metrics::MONITOR_OUTCOMES_TOTAL.with_label_values(&[severity_label(&severity)]).inc();
        notifier.send(severity, &text).await;
    })
}

fn severity_label(s: &Severity) -> &'static str {
    match s {
        Severity::Success => "successful",
        Severity::Error => "failed",
        Severity::Update => "other",
    }
}

async fn run(orchestrator: &dyn Orchestrator, evaluation_id: &str) -> Outcome {
    let deadline = tokio::time::sleep(OVERALL_TIMEOUT);
    tokio::pin!(deadline);

    let mut state = MonitorState::EvalPending;
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let mut last_status = "running".to_string();

    loop {
        tokio::select! {
            _ = &mut deadline => {
                return Outcome::Other(last_status);
            }
            _ = interval.tick() => {
                match &state {
                    MonitorState::EvalPending => {
                        match orchestrator.get_evaluation(evaluation_id).await {
                            Ok(eval) => {
                                let status = if eval.status_description.is_empty() {
                                    eval.status.clone()
                                } else {
                                    eval.status_description.clone()
                                };
                                if status == "complete" {
                                    if let Some(deployment_id) = eval.deployment_id {
                                        state = MonitorState::DeployPending { deployment_id };
                                    }
                                }
                            }
                            Err(e) => debug!(error = %e, "transient error polling evaluation, retrying"),
                        }
                    }
                    MonitorState::DeployPending { deployment_id } => {
                        match orchestrator.get_deployment(deployment_id).await {
                            Ok(deployment) => {
                                last_status = deployment.status.clone();
                                if deployment.status != "running" {
                                    return match deployment.status.as_str() {
                                        "successful" => Outcome::Successful,
                                        "failed" => Outcome::Failed,
                                        other => Outcome::Other(other.to_string()),
                                    };
                                }
                            }
                            Err(e) => debug!(error = %e, "transient error polling deployment, retrying"),
                        }
                    }
                }
            }
        }
    }
}
