use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::{Result, WatcherError};

use super::Store;

/// `Store` backed by the single-table SQLite layout: one row per
/// repository, `(repository_name PRIMARY KEY, pinned_tag, auto_deploy)`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS repository_policy (
                repository_name TEXT PRIMARY KEY,
                pinned_tag TEXT NOT NULL DEFAULT '',
                auto_deploy BOOLEAN NOT NULL DEFAULT true
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    fn transient(source: sqlx::Error) -> WatcherError {
        WatcherError::TransientExternal { system: "store", source: source.into() }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_pinned_tag(&self, repo: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>(
            "SELECT pinned_tag FROM repository_policy WHERE repository_name = ?",
        )
        .bind(repo)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::transient)
    }

    async fn get_auto_deploy(&self, repo: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT auto_deploy FROM repository_policy WHERE repository_name = ?",
        )
        .bind(repo)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::transient)
    }

    async fn set_pinned_tag(&self, repo: &str, tag: &str) -> Result<()> {
        sqlx::query("UPDATE repository_policy SET pinned_tag = ? WHERE repository_name = ?")
            .bind(tag)
            .bind(repo)
            .execute(&self.pool)
            .await
            .map_err(Self::transient)?;
        Ok(())
    }

    async fn set_auto_deploy(&self, repo: &str, auto_deploy: bool) -> Result<()> {
        sqlx::query("UPDATE repository_policy SET auto_deploy = ? WHERE repository_name = ?")
            .bind(auto_deploy)
            .bind(repo)
            .execute(&self.pool)
            .await
            .map_err(Self::transient)?;
        Ok(())
    }

    async fn get_all(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT repository_name, pinned_tag FROM repository_policy")
                .fetch_all(&self.pool)
                .await
                .map_err(Self::transient)?;
        Ok(rows.into_iter().collect())
    }

    async fn ensure_repo(&self, repo: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO repository_policy (repository_name, pinned_tag, auto_deploy)
             VALUES (?, '', true)
             ON CONFLICT(repository_name) DO NOTHING",
        )
        .bind(repo)
        .execute(&self.pool)
        .await
        .map_err(Self::transient)?;
        Ok(())
    }
}
