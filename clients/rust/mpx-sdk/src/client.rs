//! High-level mpx client and the authenticated HTTP layer beneath it

use crate::auth::UserSession;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::factory::{DataObject, DataObjectFactory};
use crate::notify::NotificationListener;
use crate::query::{ObjectListQuery, Range};
use crate::response::check_response;
use crate::service::{DataService, DomainResolver, RegistryResolver};
use crate::token::Token;
use bytes::Bytes;
use reqwest::{Method, Request, Url};
use std::sync::Arc;
use tracing::{debug, warn};

/// mpx API client
///
/// Ties a [`UserSession`], the authenticated HTTP layer and a domain resolver
/// together and hands out factories and listeners for data services.
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<Config>,
    auth_client: AuthenticatedClient,
    resolver: Arc<dyn DomainResolver>,
}

impl Client {
    /// Create a client with an in-memory token cache, an in-process lock and
    /// registry-based domain resolution
    pub async fn new(config: Config) -> Result<Self> {
        let http_client = config.http_client()?;
        let session = UserSession::from_config(&config, http_client.clone());
        Self::from_session(config, http_client, session)
    }

    /// Create a client around a session configured by the caller, e.g. one
    /// sharing a redis token cache and lock with other processes
    pub fn from_session(config: Config, http_client: reqwest::Client, session: UserSession) -> Result<Self> {
        if config.page_size == 0 {
            return Err(Error::Config("page size must be at least 1".into()));
        }

        let auth_client = AuthenticatedClient::new(http_client, Arc::new(session));
        let resolver: Arc<dyn DomainResolver> =
            Arc::new(RegistryResolver::new(auth_client.clone(), config.access_url.clone()));

        Ok(Self {
            config: Arc::new(config),
            auth_client,
            resolver,
        })
    }

    /// Replace the domain resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn DomainResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The authenticated HTTP layer
    pub fn authenticated(&self) -> &AuthenticatedClient {
        &self.auth_client
    }

    pub fn session(&self) -> &Arc<UserSession> {
        self.auth_client.session()
    }

    /// Factory for objects of type `T` served by `service`
    pub fn factory<T: DataObject>(&self, service: DataService) -> DataObjectFactory<T> {
        DataObjectFactory::new(service, self.auth_client.clone(), self.resolver.clone())
    }

    /// Notification listener for `service`
    pub fn listener<T: DataObject>(&self, service: DataService, client_id: impl Into<String>) -> NotificationListener<T> {
        NotificationListener::new(self.factory(service), client_id)
    }

    /// An empty query paging by the configured page size
    pub fn query(&self) -> Result<ObjectListQuery> {
        Ok(ObjectListQuery::new().with_range(Range::first(self.config.page_size)?))
    }

    /// Sign out the session's current token
    pub async fn sign_out(&self) -> Result<()> {
        self.auth_client.session().sign_out_current().await
    }
}

/// A successful mpx response, body already read
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

/// HTTP client that signs every request with the session's token.
///
/// The token travels in the `token` query parameter. A request rejected with
/// a 401 is retried exactly once with a freshly issued token; a second 401,
/// or any other failure, is returned to the caller.
///
/// Every call is a single future. Dropping it cancels whichever request is in
/// flight, initial or retried, and nothing is left running in the background.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    http_client: reqwest::Client,
    session: Arc<UserSession>,
}

impl AuthenticatedClient {
    pub fn new(http_client: reqwest::Client, session: Arc<UserSession>) -> Self {
        Self {
            http_client,
            session,
        }
    }

    pub fn session(&self) -> &Arc<UserSession> {
        &self.session
    }

    /// Get the underlying HTTP client
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Issue a GET request with the given query parameters
    pub async fn get<K, V>(&self, url: Url, query: &[(K, V)]) -> Result<ApiResponse>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = url;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k.as_ref(), v.as_ref());
            }
        }
        self.send(Request::new(Method::GET, url)).await
    }

    /// Send a request, retrying once if its token is rejected
    pub async fn send(&self, request: Request) -> Result<ApiResponse> {
        let retry = request
            .try_clone()
            .ok_or_else(|| Error::InvalidResponse("request body cannot be replayed".into()))?;

        let token = self.session.acquire_token(None, false).await?;
        match self.execute(with_token(request, &token)).await {
            Err(e) if e.is_token_auth_error() => {
                warn!(
                    method = %retry.method(),
                    url = %redacted_url(retry.url()),
                    "Token rejected, re-authenticating and retrying once"
                );
                let token = self.session.replace_token(&token).await?;
                self.execute(with_token(retry, &token)).await
            }
            other => other,
        }
    }

    async fn execute(&self, request: Request) -> Result<ApiResponse> {
        debug!(method = %request.method(), url = %redacted_url(request.url()), "mpx request");

        let response = self.http_client.execute(request).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        check_response(status, &body)?;
        Ok(ApiResponse { status, body })
    }
}

/// Replace any `token` query parameter with the given token
pub(crate) fn with_token(mut request: Request, token: &Token) -> Request {
    let pairs: Vec<(String, String)> = request
        .url()
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    request
        .url_mut()
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("token", token.value());
    request
}

/// URL with the token value masked, for logs
fn redacted_url(url: &Url) -> String {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "<redacted>".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_token_replaces_existing_token() {
        let url = Url::parse("https://data.media.theplatform.com/media/data/Media/1?schema=1.10&token=old&form=cjson").unwrap();
        let request = with_token(Request::new(Method::GET, url), &Token::new("new", 60));

        let pairs: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("schema".to_string(), "1.10".to_string()),
                ("form".to_string(), "cjson".to_string()),
                ("token".to_string(), "new".to_string()),
            ]
        );
    }

    #[test]
    fn test_redacted_url_hides_token() {
        let url = Url::parse("https://example.com/x?token=secret&schema=1.0").unwrap();
        let text = redacted_url(&url);
        assert!(!text.contains("secret"));
        assert!(text.contains("schema=1.0"));
    }
}
