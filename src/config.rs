//! Configuration loading: a TOML file (path from `CONFIG_FILE`, default
//! `config.toml`) merged with `APP_`-prefixed environment variable
//! overrides, via the `config` crate.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WatcherError};

#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub registry_name: String,
    pub nomad_job_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub scheme: String,
    pub domain: String,
    pub prefix: String,
    #[serde(default)]
    pub auth: String,
}

/// Endpoint a repository resolves to, after joining `repo_map` and
/// `registry_map`.
#[derive(Debug, Clone)]
pub struct RegistryEndpoint {
    pub scheme: String,
    pub domain: String,
    pub prefix: String,
    pub auth: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub watched_repositories: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    pub repo_map: HashMap<String, RepoConfig>,
    pub registry_map: HashMap<String, RegistryConfig>,
    pub webhook_url: String,
    #[serde(default = "default_listening_address")]
    pub server_listening_address: String,
    #[serde(default)]
    pub database_url: Option<String>,
    pub nomad_address: String,
    #[serde(default)]
    pub vault_token: Option<String>,
}

fn default_poll_interval() -> String {
    "30s".to_string()
}

fn default_listening_address() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub watched_repositories: Vec<String>,
    pub poll_interval: Duration,
    pub repo_map: HashMap<String, RepoConfig>,
    pub registry_endpoints: HashMap<String, RegistryEndpoint>,
    pub webhook_url: String,
    pub server_listening_address: String,
    pub database_url: Option<String>,
    pub nomad_address: String,
    pub vault_token: Option<String>,
}

impl AppConfig {
    /// Loads `CONFIG_FILE` (default `config.toml`), overridden by `APP_*`
    /// environment variables, and validates it into the shape the rest of
    /// the crate uses.
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        let raw: RawConfig = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()
            .map_err(|e| WatcherError::ConfigInvalid(e.to_string()))?
            .try_deserialize()
            .map_err(|e| WatcherError::ConfigInvalid(e.to_string()))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let poll_interval = parse_duration(&raw.poll_interval)?;

        let mut registry_endpoints = HashMap::with_capacity(raw.watched_repositories.len());
        for repo in &raw.watched_repositories {
            let repo_cfg = raw.repo_map.get(repo).ok_or_else(|| {
                WatcherError::ConfigInvalid(format!("repo_map missing entry for {repo}"))
            })?;
            let registry_cfg = raw.registry_map.get(&repo_cfg.registry_name).ok_or_else(|| {
                WatcherError::ConfigInvalid(format!(
                    "registry_map missing entry for {}",
                    repo_cfg.registry_name
                ))
            })?;
            registry_endpoints.insert(
                repo.clone(),
                RegistryEndpoint {
                    scheme: registry_cfg.scheme.clone(),
                    domain: registry_cfg.domain.clone(),
                    prefix: registry_cfg.prefix.clone(),
                    auth: registry_cfg.auth.clone(),
                },
            );
        }

        Ok(Self {
            watched_repositories: raw.watched_repositories,
            poll_interval,
            repo_map: raw.repo_map,
            registry_endpoints,
            webhook_url: raw.webhook_url,
            server_listening_address: raw.server_listening_address,
            database_url: raw.database_url,
            nomad_address: raw.nomad_address,
            vault_token: raw.vault_token,
        })
    }
}

/// Parses a duration string like `"30s"`, `"5m"`, `"1h"`, or a bare integer
/// of seconds.
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || WatcherError::ConfigInvalid(format!("invalid poll_interval: {s}"));

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let (value, unit) = s.split_at(s.len() - 1);
    let value: u64 = value.parse().map_err(|_| invalid())?;
    match unit {
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(invalid()),
    }
}
