use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use registrywatcher::config::AppConfig;
use registrywatcher::notifications::{Notifier, WebhookNotifier};
use registrywatcher::orchestrator::{NomadOrchestrator, Orchestrator};
use registrywatcher::registry::{OciRegistry, Registry};
use registrywatcher::store::{MemoryStore, SqliteStore, Store};
use registrywatcher::worker::Worker;
use registrywatcher::{admin, cache::Cache, metrics};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "registrywatcher=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting registrywatcher");
    metrics::init();

    let config = AppConfig::load().context("loading configuration")?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(SqliteStore::connect(url).await.context("connecting to store")?),
        None => Arc::new(MemoryStore::new()),
    };
    for repo in &config.watched_repositories {
        store.ensure_repo(repo).await.context("initializing store row")?;
    }

    let registry: Arc<dyn Registry> =
        Arc::new(OciRegistry::new(config.registry_endpoints.clone()).context("building registry client")?);
    let orchestrator: Arc<dyn Orchestrator> =
        Arc::new(NomadOrchestrator::new(config.nomad_address.clone(), config.vault_token.clone())?);
    let notifier: Arc<dyn Notifier> =
        Arc::new(WebhookNotifier::new(config.webhook_url.clone()).context("building notifier")?);

    let cache = Cache::new(config.watched_repositories.iter().cloned());

    let mut worker_handles = Vec::new();
    for repo in &config.watched_repositories {
        let repo_config = config
            .repo_map
            .get(repo)
            .ok_or_else(|| anyhow::anyhow!("repo_map missing entry for {repo}"))?;
        let endpoint = config
            .registry_endpoints
            .get(repo)
            .ok_or_else(|| anyhow::anyhow!("registry endpoint missing for {repo}"))?
            .clone();

        let worker = Worker {
            repo: repo.clone(),
            nomad_job_name: repo_config.nomad_job_name.clone(),
            endpoint,
            poll_interval: config.poll_interval,
            vault_token: config.vault_token.clone(),
            registry: registry.clone(),
            orchestrator: orchestrator.clone(),
            store: store.clone(),
            cache: cache.clone(),
            notifier: notifier.clone(),
        };
        worker_handles.push(tokio::spawn(worker.run()));
    }

    let admin_handle = tokio::spawn({
        let store = store.clone();
        let listening_address = config.server_listening_address.clone();
        async move { admin::serve(&listening_address, store).await }
    });

    info!("registrywatcher is running, watching {} repositories", config.watched_repositories.len());

    // Workers never return; if the admin server exits, or any worker
    // panics/stops, that is the meaningful event to log and shut down on.
    tokio::select! {
        result = admin_handle => {
            info!("admin server stopped: {:?}", result);
        }
        _ = futures::future::select_all(worker_handles.into_iter().map(Box::pin)) => {
            info!("a worker task stopped unexpectedly");
        }
    }

    Ok(())
}
