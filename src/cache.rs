//! Per-repository cache of last-observed registry tags and pinned-tag
//! digest. Each repository's entry is written by exactly one worker task;
//! the map itself only needs to be safe across different repositories.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Result, WatcherError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub tags: Vec<String>,
    pub digest: String,
}

#[derive(Clone)]
pub struct Cache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl Cache {
    /// Builds a cache pre-populated with an empty entry for every watched
    /// repository, per the lifecycle rule in the data model.
    pub fn new(repos: impl IntoIterator<Item = String>) -> Self {
        let map = repos
            .into_iter()
            .map(|r| (r, CacheEntry::default()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn get_tags(&self, repo: &str) -> Result<Vec<String>> {
        self.entry(repo).await.map(|e| e.tags)
    }

    pub async fn get_digest(&self, repo: &str) -> Result<String> {
        self.entry(repo).await.map(|e| e.digest)
    }

    pub async fn set_tags(&self, repo: &str, tags: Vec<String>) -> Result<()> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .get_mut(repo)
            .ok_or_else(|| WatcherError::CacheMiss { repo: repo.to_string() })?;
        entry.tags = tags;
        Ok(())
    }

    pub async fn set_digest(&self, repo: &str, digest: String) -> Result<()> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .get_mut(repo)
            .ok_or_else(|| WatcherError::CacheMiss { repo: repo.to_string() })?;
        entry.digest = digest;
        Ok(())
    }

    async fn entry(&self, repo: &str) -> Result<CacheEntry> {
        let guard = self.inner.read().await;
        guard
            .get(repo)
            .cloned()
            .ok_or_else(|| WatcherError::CacheMiss { repo: repo.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_repo_starts_empty() {
        let cache = Cache::new(["myorg/api".to_string()]);
        assert_eq!(cache.get_tags("myorg/api").await.unwrap(), Vec::<String>::new());
        assert_eq!(cache.get_digest("myorg/api").await.unwrap(), "");
    }

    #[tokio::test]
    async fn missing_repo_is_cache_miss() {
        let cache = Cache::new(["myorg/api".to_string()]);
        assert!(matches!(
            cache.get_tags("unknown").await,
            Err(WatcherError::CacheMiss { .. })
        ));
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = Cache::new(["myorg/api".to_string()]);
        cache
            .set_tags("myorg/api", vec!["v1.0.0".to_string()])
            .await
            .unwrap();
        cache.set_digest("myorg/api", "D1".to_string()).await.unwrap();
        assert_eq!(cache.get_tags("myorg/api").await.unwrap(), vec!["v1.0.0"]);
        assert_eq!(cache.get_digest("myorg/api").await.unwrap(), "D1");
    }

    #[tokio::test]
    async fn distinct_repos_do_not_interfere() {
        let cache = Cache::new(["a".to_string(), "b".to_string()]);
        cache.set_digest("a", "Da".to_string()).await.unwrap();
        assert_eq!(cache.get_digest("b").await.unwrap(), "");
    }
}
