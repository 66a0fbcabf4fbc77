use crate::forge::models::{Envelope, ForgeMod, UpdateReport};
use async_trait::async_trait;
use reqwest::{Client, Error as ReqwestError, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("forge-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),
    #[error("API rate limit exceeded")]
    RateLimit,
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Mod not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Portal rejected the request: {0}")]
    Rejected(StatusCode),
}

/// The injected catalog capability. The matcher and orchestrators only ever
/// see this trait, which keeps them testable without network access.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Exact lookup by reverse-domain identifier. `None` when absent.
    async fn lookup_by_guid(&self, guid: &str) -> Result<Option<ForgeMod>, ForgeError>;

    /// Exact lookup by portal slug. `None` when absent.
    async fn lookup_by_slug(&self, slug: &str) -> Result<Option<ForgeMod>, ForgeError>;

    /// Name search with a bounded result count.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<ForgeMod>, ForgeError>;

    /// Full detail (including release assets) for an id or slug.
    async fn get_detail(&self, id_or_slug: &str) -> Result<Option<ForgeMod>, ForgeError>;

    /// Update status for a batch of `(guid, installed version)` pairs against
    /// a target SPT version, when one is configured.
    async fn get_update_status(
        &self,
        pairs: &[(String, String)],
        spt_version: Option<&str>,
    ) -> Result<UpdateReport, ForgeError>;
}

/// Production client for the Forge v0 API.
#[derive(Clone)]
pub struct ForgeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ForgeClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    fn mods_url(&self, filter_key: &str, filter_value: &str, per_page: u32) -> String {
        format!(
            "{}/api/v0/mods?per_page={}&filter[{}]={}",
            self.base_url,
            per_page,
            filter_key,
            urlencoding::encode(filter_value)
        )
    }

    async fn get_mods(&self, url: &str) -> Result<Vec<ForgeMod>, ForgeError> {
        debug!("Forge API: GET {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let envelope: Envelope<Vec<ForgeMod>> = response.json().await?;
            if !envelope.success {
                warn!("Forge API reported failure for {}", url);
                return Ok(Vec::new());
            }
            Ok(envelope.data.unwrap_or_default())
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Forge rate limit exceeded");
            Err(ForgeError::RateLimit)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("Forge rejected API key");
            Err(ForgeError::InvalidApiKey)
        } else {
            warn!("Forge API error: {} for {}", status, url);
            Err(ForgeError::Rejected(status))
        }
    }

    async fn filtered_lookup(
        &self,
        filter_key: &str,
        filter_value: &str,
    ) -> Result<Option<ForgeMod>, ForgeError> {
        let url = self.mods_url(filter_key, filter_value, 1);
        let mods = self.get_mods(&url).await?;
        Ok(mods.into_iter().next())
    }
}

#[async_trait]
impl CatalogClient for ForgeClient {
    async fn lookup_by_guid(&self, guid: &str) -> Result<Option<ForgeMod>, ForgeError> {
        self.filtered_lookup("guid", guid).await
    }

    async fn lookup_by_slug(&self, slug: &str) -> Result<Option<ForgeMod>, ForgeError> {
        self.filtered_lookup("slug", slug).await
    }

    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<ForgeMod>, ForgeError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.mods_url("name", query, max_results);
        self.get_mods(&url).await
    }

    async fn get_detail(&self, id_or_slug: &str) -> Result<Option<ForgeMod>, ForgeError> {
        let url = format!(
            "{}/api/v0/mods/{}",
            self.base_url,
            urlencoding::encode(id_or_slug)
        );
        debug!("Forge API: GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let envelope: Envelope<ForgeMod> = response.json().await?;
            Ok(envelope.data.filter(|_| envelope.success))
        } else if status == StatusCode::NOT_FOUND {
            Ok(None)
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(ForgeError::RateLimit)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ForgeError::InvalidApiKey)
        } else {
            Err(ForgeError::Rejected(status))
        }
    }

    async fn get_update_status(
        &self,
        pairs: &[(String, String)],
        spt_version: Option<&str>,
    ) -> Result<UpdateReport, ForgeError> {
        let mods_param = pairs
            .iter()
            .map(|(guid, version)| format!("{}:{}", guid, version))
            .collect::<Vec<_>>()
            .join(",");
        let mut url = format!(
            "{}/api/v0/mods/updates?mods={}",
            self.base_url,
            urlencoding::encode(&mods_param)
        );
        if let Some(spt) = spt_version {
            url.push_str(&format!("&spt_version={}", urlencoding::encode(spt)));
        }

        debug!("Forge API: GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let envelope: Envelope<UpdateReport> = response.json().await?;
            Ok(envelope.data.unwrap_or_default())
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(ForgeError::RateLimit)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ForgeError::InvalidApiKey)
        } else {
            Err(ForgeError::Rejected(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mods_url_shape() {
        let c = ForgeClient::new("key".into(), "https://forge.example".into());
        assert_eq!(
            c.mods_url("guid", "com.a.b", 1),
            "https://forge.example/api/v0/mods?per_page=1&filter[guid]=com.a.b"
        );
    }

    #[test]
    fn test_mods_url_encodes_filter_value() {
        let c = ForgeClient::new("key".into(), "https://forge.example".into());
        assert_eq!(
            c.mods_url("name", "Croupier - loadout generator", 5),
            "https://forge.example/api/v0/mods?per_page=5&filter[name]=Croupier%20-%20loadout%20generator"
        );
    }
}
