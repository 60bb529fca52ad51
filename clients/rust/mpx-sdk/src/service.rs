//! Data service descriptions and base URL resolution

use crate::client::AuthenticatedClient;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A named mpx API surface serving one object type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataService {
    /// Registry name, e.g. `Media Data Service`
    pub name: &'static str,
    /// Object type name as used in notifications, e.g. `Media`
    pub object_type: &'static str,
    /// Object path below the resolved base URL, e.g. `/data/Media`
    pub path: &'static str,
    /// Schema version sent with every request
    pub schema_version: &'static str,
    /// Whether the service's base URL depends on the account
    pub has_account_context: bool,
}

pub const MEDIA_DATA_SERVICE: DataService = DataService {
    name: "Media Data Service",
    object_type: "Media",
    path: "/data/Media",
    schema_version: "1.10",
    has_account_context: true,
};

pub const PLAYER_DATA_SERVICE: DataService = DataService {
    name: "Player Data Service",
    object_type: "Player",
    path: "/data/Player",
    schema_version: "1.6",
    has_account_context: true,
};

pub const ACCOUNT_DATA_SERVICE: DataService = DataService {
    name: "Access Data Service",
    object_type: "Account",
    path: "/data/Account",
    schema_version: "1.0",
    has_account_context: false,
};

/// An mpx account, identified by its URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Resolves the base URL of a data service
#[async_trait]
pub trait DomainResolver: Send + Sync + fmt::Debug {
    async fn resolve(&self, service: &DataService, account: Option<&Account>) -> Result<Url>;
}

/// Fixed service-name to base-URL map
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    bases: HashMap<String, Url>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, name: &str, base: &str) -> Result<Self> {
        self.bases.insert(name.to_string(), Url::parse(base)?);
        Ok(self)
    }
}

#[async_trait]
impl DomainResolver for StaticResolver {
    async fn resolve(&self, service: &DataService, _account: Option<&Account>) -> Result<Url> {
        self.bases
            .get(service.name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no base URL configured for {}", service.name)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveDomainEnvelope {
    resolve_domain_response: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveAllUrlsEnvelope {
    resolve_all_urls_response: Vec<String>,
}

/// Resolves base URLs through the mpx access registry, caching answers
#[derive(Debug)]
pub struct RegistryResolver {
    client: AuthenticatedClient,
    access_url: String,
    domains: DashMap<String, HashMap<String, String>>,
    services: DashMap<String, String>,
}

impl RegistryResolver {
    pub fn new(client: AuthenticatedClient, access_url: impl Into<String>) -> Self {
        Self {
            client,
            access_url: access_url.into().trim_end_matches('/').to_string(),
            domains: DashMap::new(),
            services: DashMap::new(),
        }
    }

    async fn resolve_domain(&self, account: &Account) -> Result<HashMap<String, String>> {
        if let Some(domain) = self.domains.get(&account.id) {
            return Ok(domain.clone());
        }

        let url = Url::parse(&format!("{}/web/Registry/resolveDomain", self.access_url))?;
        let response = self
            .client
            .get(url, &[("schema", "1.1"), ("form", "json"), ("_accountId", account.id.as_str())])
            .await?;
        let envelope: ResolveDomainEnvelope = serde_json::from_slice(&response.body)?;

        debug!(account = %account.id, services = envelope.resolve_domain_response.len(), "Resolved account domain");
        self.domains
            .insert(account.id.clone(), envelope.resolve_domain_response.clone());
        Ok(envelope.resolve_domain_response)
    }

    async fn resolve_all_urls(&self, service: &DataService) -> Result<String> {
        if let Some(url) = self.services.get(service.name) {
            return Ok(url.clone());
        }

        let url = Url::parse(&format!("{}/web/Registry/resolveAllUrls", self.access_url))?;
        let response = self
            .client
            .get(url, &[("schema", "1.1"), ("form", "json"), ("_service", service.name)])
            .await?;
        let envelope: ResolveAllUrlsEnvelope = serde_json::from_slice(&response.body)?;
        let first = envelope
            .resolve_all_urls_response
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse(format!("no URL registered for {}", service.name)))?;

        self.services.insert(service.name.to_string(), first.clone());
        Ok(first)
    }
}

#[async_trait]
impl DomainResolver for RegistryResolver {
    async fn resolve(&self, service: &DataService, account: Option<&Account>) -> Result<Url> {
        let base = match account {
            Some(account) if service.has_account_context => {
                let domain = self.resolve_domain(account).await?;
                domain.get(service.name).cloned().ok_or_else(|| {
                    Error::InvalidResponse(format!("{} is not available to account {}", service.name, account.id))
                })?
            }
            _ => self.resolve_all_urls(service).await?,
        };
        Ok(Url::parse(&upgrade_to_https(&base))?)
    }
}

/// The registry still reports some services with plain http
fn upgrade_to_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

/// Append a path to a base URL, keeping the base's own path
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}
