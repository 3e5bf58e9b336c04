//! Registry external collaborator: list tags for a repository and fetch the
//! digest of a given tag.

mod oci;

pub use oci::OciRegistry;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Lists every tag for `repo`, in whatever order the registry returns
    /// them. The core is responsible for filtering and sorting.
    async fn list_tags(&self, repo: &str) -> Result<Vec<String>>;

    /// Fetches the content digest of `repo:tag`.
    async fn get_digest(&self, repo: &str, tag: &str) -> Result<String>;
}
