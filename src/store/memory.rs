use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, WatcherError};

use super::Store;

#[derive(Debug, Clone, Default)]
struct Row {
    pinned_tag: String,
    auto_deploy: bool,
}

/// In-memory `Store`, used when no `database_url` is configured and by
/// tests.
#[derive(Default, Clone)]
pub struct MemoryStore {
    rows: Arc<RwLock<HashMap<String, Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(repo: &str) -> WatcherError {
        WatcherError::NotFound(format!("no store row for repository {repo}"))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_pinned_tag(&self, repo: &str) -> Result<String> {
        self.rows
            .read()
            .await
            .get(repo)
            .map(|r| r.pinned_tag.clone())
            .ok_or_else(|| Self::missing(repo))
    }

    async fn get_auto_deploy(&self, repo: &str) -> Result<bool> {
        self.rows
            .read()
            .await
            .get(repo)
            .map(|r| r.auto_deploy)
            .ok_or_else(|| Self::missing(repo))
    }

    async fn set_pinned_tag(&self, repo: &str, tag: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(repo).ok_or_else(|| Self::missing(repo))?;
        row.pinned_tag = tag.to_string();
        Ok(())
    }

    async fn set_auto_deploy(&self, repo: &str, auto_deploy: bool) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(repo).ok_or_else(|| Self::missing(repo))?;
        row.auto_deploy = auto_deploy;
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .map(|(repo, row)| (repo.clone(), row.pinned_tag.clone()))
            .collect())
    }

    async fn ensure_repo(&self, repo: &str) -> Result<()> {
        self.rows.write().await.entry(repo.to_string()).or_insert_with(|| Row {
            pinned_tag: String::new(),
            auto_deploy: true,
        });
        Ok(())
    }
}
