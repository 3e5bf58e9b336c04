//! Store external collaborator: persisted per-repository policy
//! (`pinned_tag`, `auto_deploy`).

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_pinned_tag(&self, repo: &str) -> Result<String>;
    async fn get_auto_deploy(&self, repo: &str) -> Result<bool>;
    async fn set_pinned_tag(&self, repo: &str, tag: &str) -> Result<()>;
    async fn set_auto_deploy(&self, repo: &str, auto_deploy: bool) -> Result<()>;
    async fn get_all(&self) -> Result<HashMap<String, String>>;

    /// Idempotently creates a row for `repo` with defaults `("", true)` if
    /// one does not already exist.
    async fn ensure_repo(&self, repo: &str) -> Result<()>;
}
