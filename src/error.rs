use thiserror::Error;

/// Domain error taxonomy for the reconciliation core.
///
/// `TransientExternal` covers any I/O failure against Registry, Orchestrator,
/// Store or Notifier; callers abort the current tick and retry on the next
/// one rather than unwinding the worker task.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("transient failure talking to {system}: {source}")]
    TransientExternal {
        system: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("cache entry for repository {repo} missing")]
    CacheMiss { repo: String },

    #[error("no release tag found among {0} candidate tags")]
    NoReleaseTag(usize),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{0}")]
    NotFound(String),

    #[error("deployment failed: {0}")]
    DeploymentFailed(String),
}

pub type Result<T> = std::result::Result<T, WatcherError>;
