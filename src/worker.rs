//! Reconciliation worker (C4): one task per watched repository, ticking on
//! `poll_interval` and driving the decision engine plus orchestrator
//! updates.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::config::RegistryEndpoint;
use crate::decision::{decide, effective_pinned_tag, CacheState, Observation, Policy};
use crate::metrics;
use crate::monitor::{spawn_monitor, MonitorHandle};
use crate::notifications::{Notifier, Severity};
use crate::orchestrator::{apply_tag_update, Orchestrator};
use crate::registry::Registry;
use crate::store::Store;
use crate::tags::filter_non_sha;

pub struct Worker {
    pub repo: String,
    pub nomad_job_name: String,
    pub endpoint: RegistryEndpoint,
    pub poll_interval: Duration,
    pub vault_token: Option<String>,
    pub registry: Arc<dyn Registry>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub store: Arc<dyn Store>,
    pub cache: Cache,
    pub notifier: Arc<dyn Notifier>,
}

impl Worker {
    /// Populates the cache for this repository and then ticks forever on
    /// `poll_interval`, never returning.
    pub async fn run(self) {
        self.initialize().await;
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                warn!(repo = %self.repo, error = %e, "tick aborted");
                metrics::TICKS_ABORTED_TOTAL.with_label_values(&[&self.repo]).inc();
            }
        }
    }

    async fn initialize(&self) {
        let tags = match self.fetch_tags().await {
            Ok(t) => t,
            Err(e) => {
                warn!(repo = %self.repo, error = %e, "initial tag fetch failed, starting from empty cache");
                return;
            }
        };

        let pinned = self.store.get_pinned_tag(&self.repo).await.unwrap_or_default();
        let effective = effective_pinned_tag(&pinned, &tags);

        if let Err(e) = self.cache.set_tags(&self.repo, tags).await {
            error!(repo = %self.repo, error = %e, "cache invariant violated during init");
            return;
        }

        if let Some(tag) = effective {
            match self.registry.get_digest(&self.repo, &tag).await {
                Ok(digest) => {
                    if let Err(e) = self.cache.set_digest(&self.repo, digest).await {
                        error!(repo = %self.repo, error = %e, "cache invariant violated during init");
                    }
                }
                Err(e) => warn!(repo = %self.repo, error = %e, "initial digest fetch failed"),
            }
        }
    }

    async fn fetch_tags(&self) -> anyhow::Result<Vec<String>> {
        let raw = self.registry.list_tags(&self.repo).await?;
        let mut tags = filter_non_sha(raw.iter().map(String::as_str));
        tags.sort();
        Ok(tags)
    }

    /// One tick: read policy, fetch observations, decide, deploy if
    /// warranted, refresh the cache exactly once. Any fetch error aborts
    /// before the cache is touched.
    async fn tick(&self) -> anyhow::Result<()> {
        metrics::TICKS_TOTAL.with_label_values(&[&self.repo]).inc();

        let policy = Policy {
            pinned_tag: self.store.get_pinned_tag(&self.repo).await?,
            auto_deploy: self.store.get_auto_deploy(&self.repo).await?,
        };

        let cache_tags = self.cache.get_tags(&self.repo).await?;
        let cache_digest = self.cache.get_digest(&self.repo).await?;
        let pre_tick_effective_pin = effective_pinned_tag(&policy.pinned_tag, &cache_tags);

        let registry_tags = self.fetch_tags().await?;
        let current_digest = match &pre_tick_effective_pin {
            Some(tag) => self.registry.get_digest(&self.repo, tag).await?,
            None => String::new(),
        };

        let cache_state = CacheState { tags: cache_tags, digest: cache_digest };
        let observed = Observation { registry_tags: registry_tags.clone(), current_digest: current_digest.clone() };

        let verdict = decide(&policy, &cache_state, &observed);

        if verdict.should_deploy {
            let tag_to_deploy = verdict.tag_to_deploy.clone().expect("deploy verdict carries a tag");

            if pre_tick_effective_pin.as_deref() == Some(tag_to_deploy.as_str()) {
                self.notify(
                    Severity::Update,
                    format!(
                        "Update: the digest of tag `{}` in `{}` changed. Auto deployment will happen shortly.",
                        tag_to_deploy, self.repo
                    ),
                )
                .await;
            }

            info!(repo = %self.repo, tag = %tag_to_deploy, "auto deploying");
            self.deploy(&tag_to_deploy).await;
        }

        self.cache.set_tags(&self.repo, registry_tags.clone()).await?;
        if cache_state.digest != current_digest {
            let refreshed_pin = effective_pinned_tag(&policy.pinned_tag, &registry_tags);
            if let Some(tag) = refreshed_pin {
                match self.registry.get_digest(&self.repo, &tag).await {
                    Ok(digest) => self.cache.set_digest(&self.repo, digest).await?,
                    Err(e) => debug!(repo = %self.repo, error = %e, "post-deploy digest refresh failed"),
                }
            }
        }

        Ok(())
    }

    async fn deploy(&self, tag_to_deploy: &str) {
        metrics::DEPLOYS_ISSUED_TOTAL.with_label_values(&[&self.repo]).inc();

        self.notify(
            Severity::Update,
            format!("Update: deploying job `{}` to tag `{}`", self.nomad_job_name, tag_to_deploy),
        )
        .await;

        let mut job = match self.orchestrator.get_job(&self.nomad_job_name).await {
            Ok(job) => job,
            Err(e) => {
                self.notify(
                    Severity::Error,
                    format!("Error: failed to fetch job `{}`: {}", self.nomad_job_name, e),
                )
                .await;
                return;
            }
        };

        apply_tag_update(
            &mut job,
            &self.repo,
            &self.endpoint.domain,
            &self.endpoint.prefix,
            tag_to_deploy,
            self.vault_token.as_deref(),
        );

        match self.orchestrator.register_job(&job).await {
            Ok(result) => {
                let _handle: MonitorHandle = spawn_monitor(
                    self.orchestrator.clone(),
                    self.notifier.clone(),
                    self.nomad_job_name.clone(),
                    tag_to_deploy.to_string(),
                    result.evaluation_id,
                );
            }
            Err(e) => {
                warn!(repo = %self.repo, error = %e, "register_job failed");
                self.notify(
                    Severity::Error,
                    format!(
                        "Error: failed to force redeploy job `{}` for tag `{}`",
                        self.nomad_job_name, tag_to_deploy
                    ),
                )
                .await;
            }
        }
    }

    async fn notify(&self, severity: Severity, text: String) {
        metrics::NOTIFICATIONS_SENT_TOTAL.inc();
        self.notifier.send(severity, &text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result as WResult, WatcherError};
    use crate::orchestrator::{Deployment, Evaluation, Job, RegisterResult, Task, TaskConfig, TaskGroup};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubRegistry {
        tags: Result<Vec<String>, &'static str>,
        digest: String,
    }

    #[async_trait]
    impl Registry for StubRegistry {
        async fn list_tags(&self, _repo: &str) -> WResult<Vec<String>> {
            self.tags.clone().map_err(|msg| WatcherError::TransientExternal {
                system: "registry",
                source: anyhow::anyhow!(msg),
            })
        }

        async fn get_digest(&self, _repo: &str, _tag: &str) -> WResult<String> {
            Ok(self.digest.clone())
        }
    }

    struct StubStore {
        pinned_tag: String,
        auto_deploy: bool,
    }

    #[async_trait]
    impl Store for StubStore {
        async fn get_pinned_tag(&self, _repo: &str) -> WResult<String> {
            Ok(self.pinned_tag.clone())
        }
        async fn get_auto_deploy(&self, _repo: &str) -> WResult<bool> {
            Ok(self.auto_deploy)
        }
        async fn set_pinned_tag(&self, _repo: &str, _tag: &str) -> WResult<()> {
            Ok(())
        }
        async fn set_auto_deploy(&self, _repo: &str, _enabled: bool) -> WResult<()> {
            Ok(())
        }
        async fn get_all(&self) -> WResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }
        async fn ensure_repo(&self, _repo: &str) -> WResult<()> {
            Ok(())
        }
    }

    /// `get_job` always returns a job with one task already on `v0.1.0`;
    /// `register_job` records the image it was asked to deploy so tests can
    /// assert on the tag the worker actually chose.
    #[derive(Default)]
    struct StubOrchestrator {
        registered_image: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Orchestrator for StubOrchestrator {
        async fn get_job(&self, job_id: &str) -> WResult<Job> {
            Ok(Job {
                id: job_id.to_string(),
                task_groups: vec![TaskGroup {
                    name: "g".to_string(),
                    tasks: vec![Task {
                        name: "main".to_string(),
                        config: TaskConfig {
                            image: "registry.example.com/myorg/api:v0.1.0".to_string(),
                            force_pull: false,
                        },
                    }],
                }],
                meta: HashMap::new(),
                vault_token: None,
            })
        }

        async fn register_job(&self, job: &Job) -> WResult<RegisterResult> {
            *self.registered_image.lock().unwrap() = Some(job.task_groups[0].tasks[0].config.image.clone());
            Ok(RegisterResult { evaluation_id: "eval-1".to_string() })
        }

        async fn get_evaluation(&self, _evaluation_id: &str) -> WResult<Evaluation> {
            Ok(Evaluation { deployment_id: None, status: "pending".to_string(), status_description: String::new() })
        }

        async fn get_deployment(&self, _deployment_id: &str) -> WResult<Deployment> {
            Ok(Deployment { status: "running".to_string() })
        }
    }

    #[derive(Default)]
    struct StubNotifier {
        sent: Mutex<Vec<(Severity, String)>>,
    }

    #[async_trait]
    impl Notifier for StubNotifier {
        async fn send(&self, severity: Severity, text: &str) {
            self.sent.lock().unwrap().push((severity, text.to_string()));
        }
    }

    fn endpoint() -> RegistryEndpoint {
        RegistryEndpoint {
            scheme: "https".to_string(),
            domain: "registry.example.com".to_string(),
            prefix: "myorg".to_string(),
            auth: String::new(),
        }
    }

    fn worker(
        registry: StubRegistry,
        store: StubStore,
        orchestrator: Arc<StubOrchestrator>,
        notifier: Arc<StubNotifier>,
    ) -> Worker {
        Worker {
            repo: "api".to_string(),
            nomad_job_name: "api".to_string(),
            endpoint: endpoint(),
            poll_interval: Duration::from_secs(30),
            vault_token: None,
            registry: Arc::new(registry),
            orchestrator,
            store: Arc::new(store),
            cache: Cache::new(["api".to_string()]),
            notifier,
        }
    }

    #[tokio::test]
    async fn s1_latest_follows_releases_no_deploy() {
        let notifier = Arc::new(StubNotifier::default());
        let w = worker(
            StubRegistry { tags: Ok(vec!["v0.0.2".into(), "v0.1.0".into(), "test".into()]), digest: "D1".to_string() },
            StubStore { pinned_tag: String::new(), auto_deploy: true },
            Arc::new(StubOrchestrator::default()),
            notifier.clone(),
        );
        w.cache.set_tags("api", vec!["v0.1.0".to_string(), "test".to_string()]).await.unwrap();
        w.cache.set_digest("api", "D1".to_string()).await.unwrap();

        w.tick().await.unwrap();

        assert!(notifier.sent.lock().unwrap().is_empty(), "no release is newer, nothing should deploy");
        let mut refreshed = w.cache.get_tags("api").await.unwrap();
        refreshed.sort();
        assert_eq!(refreshed, vec!["test".to_string(), "v0.0.2".to_string(), "v0.1.0".to_string()]);
    }

    #[tokio::test]
    async fn s2_new_release_deploys_and_refreshes_cache() {
        let notifier = Arc::new(StubNotifier::default());
        let orchestrator = Arc::new(StubOrchestrator::default());
        let w = worker(
            StubRegistry { tags: Ok(vec!["v0.1.0".into(), "v0.2.0".into(), "test".into()]), digest: "D2".to_string() },
            StubStore { pinned_tag: String::new(), auto_deploy: true },
            orchestrator.clone(),
            notifier.clone(),
        );
        w.cache.set_tags("api", vec!["v0.1.0".to_string(), "test".to_string()]).await.unwrap();
        w.cache.set_digest("api", "D1".to_string()).await.unwrap();

        w.tick().await.unwrap();

        assert_eq!(
            orchestrator.registered_image.lock().unwrap().as_deref(),
            Some("registry.example.com/myorg/api:v0.2.0")
        );
        assert!(!notifier.sent.lock().unwrap().is_empty());
        assert_eq!(w.cache.get_digest("api").await.unwrap(), "D2");
    }

    #[tokio::test]
    async fn s3_custom_pin_digest_drift_deploys_pinned_tag() {
        let notifier = Arc::new(StubNotifier::default());
        let orchestrator = Arc::new(StubOrchestrator::default());
        let w = worker(
            StubRegistry { tags: Ok(vec!["v0.1.0".into(), "test".into()]), digest: "Dnew".to_string() },
            StubStore { pinned_tag: "test".to_string(), auto_deploy: true },
            orchestrator.clone(),
            notifier.clone(),
        );
        w.cache.set_tags("api", vec!["v0.1.0".to_string(), "test".to_string()]).await.unwrap();
        w.cache.set_digest("api", "Dold".to_string()).await.unwrap();

        w.tick().await.unwrap();

        assert_eq!(
            orchestrator.registered_image.lock().unwrap().as_deref(),
            Some("registry.example.com/myorg/api:test")
        );
    }

    #[tokio::test]
    async fn s4_auto_deploy_off_never_deploys() {
        let notifier = Arc::new(StubNotifier::default());
        let w = worker(
            StubRegistry { tags: Ok(vec!["v9.9.9".into(), "test".into()]), digest: "Dnew".to_string() },
            StubStore { pinned_tag: "test".to_string(), auto_deploy: false },
            Arc::new(StubOrchestrator::default()),
            notifier.clone(),
        );
        w.cache.set_tags("api", vec!["v0.1.0".to_string(), "test".to_string()]).await.unwrap();
        w.cache.set_digest("api", "Dold".to_string()).await.unwrap();

        w.tick().await.unwrap();

        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    /// Regression test: the registry no longer lists the release tag that
    /// was previously deployed, but its digest (resolved against the
    /// pre-tick cache's pin) changed. The deploy target must still resolve
    /// from the pre-tick cache tags, not the freshly observed registry tags.
    #[tokio::test]
    async fn digest_changed_branch_resolves_pin_from_pre_tick_cache() {
        let notifier = Arc::new(StubNotifier::default());
        let orchestrator = Arc::new(StubOrchestrator::default());
        let w = worker(
            StubRegistry { tags: Ok(vec!["v0.1.0".into()]), digest: "Dnew".to_string() },
            StubStore { pinned_tag: String::new(), auto_deploy: true },
            orchestrator.clone(),
            notifier.clone(),
        );
        w.cache.set_tags("api", vec!["v0.1.0".to_string(), "v0.2.0".to_string()]).await.unwrap();
        w.cache.set_digest("api", "Dold".to_string()).await.unwrap();

        w.tick().await.unwrap();

        assert_eq!(
            orchestrator.registered_image.lock().unwrap().as_deref(),
            Some("registry.example.com/myorg/api:v0.2.0")
        );
    }

    #[tokio::test]
    async fn fetch_error_aborts_tick_without_mutating_cache() {
        let notifier = Arc::new(StubNotifier::default());
        let w = worker(
            StubRegistry { tags: Err("registry unreachable"), digest: "D1".to_string() },
            StubStore { pinned_tag: String::new(), auto_deploy: true },
            Arc::new(StubOrchestrator::default()),
            notifier.clone(),
        );
        w.cache.set_tags("api", vec!["v0.1.0".to_string()]).await.unwrap();
        w.cache.set_digest("api", "D1".to_string()).await.unwrap();

        assert!(w.tick().await.is_err());

        assert_eq!(w.cache.get_tags("api").await.unwrap(), vec!["v0.1.0".to_string()]);
        assert_eq!(w.cache.get_digest("api").await.unwrap(), "D1".to_string());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
