use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use tracing::debug;

use crate::config::RegistryEndpoint;
use crate::error::{Result, WatcherError};

use super::Registry;

/// Resolves each watched repository to its registry endpoint and talks to
/// that endpoint over OCI distribution.
pub struct OciRegistry {
    client: Client,
    /// repository -> (endpoint, decoded auth)
    endpoints: HashMap<String, (RegistryEndpoint, RegistryAuth)>,
}

impl OciRegistry {
    pub fn new(endpoints: HashMap<String, RegistryEndpoint>) -> anyhow::Result<Self> {
        let protocol = ClientProtocol::Https;
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        let mut resolved = HashMap::with_capacity(endpoints.len());
        for (repo, endpoint) in endpoints {
            let auth = decode_auth(&endpoint.auth)
                .with_context(|| format!("decoding registry auth for {repo}"))?;
            resolved.insert(repo, (endpoint, auth));
        }

        Ok(Self { client, endpoints: resolved })
    }

    fn reference(&self, repo: &str, tag: &str) -> Result<(Reference, &RegistryAuth)> {
        let (endpoint, auth) = self.endpoints.get(repo).ok_or_else(|| {
            WatcherError::ConfigInvalid(format!("no registry endpoint configured for {repo}"))
        })?;
        let image = format!("{}/{}/{}:{}", endpoint.domain, endpoint.prefix, repo, tag);
        let reference = Reference::try_from(image.as_str()).map_err(|e| {
            WatcherError::TransientExternal { system: "registry", source: e.into() }
        })?;
        Ok((reference, auth))
    }
}

/// Decodes a base64 `user:password` auth string into OCI registry auth.
/// An empty string means anonymous access.
fn decode_auth(encoded: &str) -> anyhow::Result<RegistryAuth> {
    if encoded.is_empty() {
        return Ok(RegistryAuth::Anonymous);
    }
    let decoded = BASE64
        .decode(encoded)
        .context("registry auth string is not valid base64")?;
    let decoded = String::from_utf8(decoded).context("registry auth string is not valid utf-8")?;
    let (user, password) = decoded
        .split_once(':')
        .context("registry auth string must be user:password")?;
    Ok(RegistryAuth::Basic(user.to_string(), password.to_string()))
}

#[async_trait]
impl Registry for OciRegistry {
    async fn list_tags(&self, repo: &str) -> Result<Vec<String>> {
        let (reference, auth) = self.reference(repo, "latest")?;
        let response = self
            .client
            .list_tags(&reference, auth, None, None)
            .await
            .map_err(|e| WatcherError::TransientExternal { system: "registry", source: e.into() })?;
        debug!("listed {} tags for {}", response.tags.len(), repo);
        Ok(response.tags)
    }

    async fn get_digest(&self, repo: &str, tag: &str) -> Result<String> {
        let (reference, auth) = self.reference(repo, tag)?;
        self.client
            .fetch_manifest_digest(&reference, auth)
            .await
            .map_err(|e| WatcherError::TransientExternal { system: "registry", source: e.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_user_password() {
        let encoded = BASE64.encode("alice:s3cret");
        let auth = decode_auth(&encoded).unwrap();
        assert!(matches!(auth, RegistryAuth::Basic(u, p) if u == "alice" && p == "s3cret"));
    }

    #[test]
    fn empty_auth_is_anonymous() {
        assert!(matches!(decode_auth("").unwrap(), RegistryAuth::Anonymous));
    }

    #[test]
    fn malformed_auth_is_rejected() {
        assert!(decode_auth("not-valid-base64!!").is_err());
    }
}
