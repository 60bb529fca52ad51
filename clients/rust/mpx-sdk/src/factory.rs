//! Typed loading and querying of mpx objects

use crate::client::AuthenticatedClient;
use crate::error::Result;
use crate::object_list::{ObjectList, ObjectListIterator, ObjectListPage};
use crate::query::ObjectListQuery;
use crate::response::decode;
use crate::service::{join_path, Account, DataService, DomainResolver};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Anything a factory can deserialize a response into
pub trait DataObject: DeserializeOwned + Send + Sync + 'static {}

impl<T: DeserializeOwned + Send + Sync + 'static> DataObject for T {}

/// Loads and queries objects of type `T` from one data service
pub struct DataObjectFactory<T> {
    service: DataService,
    client: AuthenticatedClient,
    resolver: Arc<dyn DomainResolver>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for DataObjectFactory<T> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            client: self.client.clone(),
            resolver: self.resolver.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for DataObjectFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObjectFactory")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl<T> DataObjectFactory<T> {
    pub fn service(&self) -> &DataService {
        &self.service
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// Base URL of the service for an account
    pub async fn base_url(&self, account: Option<&Account>) -> Result<Url> {
        self.resolver.resolve(&self.service, account).await
    }

    /// URL of the object collection
    pub async fn objects_url(&self, account: Option<&Account>) -> Result<Url> {
        let base = self.base_url(account).await?;
        join_path(&base, self.service.path)
    }
}

impl<T: DataObject> DataObjectFactory<T> {
    pub fn new(service: DataService, client: AuthenticatedClient, resolver: Arc<dyn DomainResolver>) -> Self {
        Self {
            service,
            client,
            resolver,
            _marker: PhantomData,
        }
    }

    /// Load one object by id or by its full URI
    pub async fn load(&self, id: &str, account: Option<&Account>) -> Result<T> {
        let url = match Url::parse(id) {
            Ok(uri) if uri.scheme() == "http" || uri.scheme() == "https" => uri,
            _ => {
                let objects = self.objects_url(account).await?;
                join_path(&objects, id)?
            }
        };

        debug!(service = %self.service.name, url = %url, "Loading object");
        let response = self
            .client
            .get(url, &[("schema", self.service.schema_version), ("form", "cjson")])
            .await?;
        decode(&response.body)
    }

    /// Request one page of objects matching `query`.
    ///
    /// The returned page can fetch the pages after it on its own.
    pub async fn select(&self, query: &ObjectListQuery, account: Option<&Account>) -> Result<ObjectList<T>> {
        let url = self.objects_url(account).await?;

        let mut params: Vec<(String, String)> = vec![
            ("schema".to_string(), self.service.schema_version.to_string()),
            ("form".to_string(), "cjson".to_string()),
        ];
        if let Some(account) = account {
            params.push(("account".to_string(), account.id.clone()));
        }
        params.extend(query.to_query_parts());

        debug!(service = %self.service.name, range = %query.range(), "Selecting objects");
        let response = self.client.get(url, &params).await?;
        let page: ObjectListPage<T> = decode(&response.body)?;

        Ok(ObjectList::from_page(page, query.range()).with_context(
            self.clone(),
            query.clone(),
            account.cloned(),
        ))
    }

    /// Iterate every object matching `query`, one page at a time
    pub fn iter(&self, query: ObjectListQuery, account: Option<Account>) -> ObjectListIterator<T> {
        ObjectListIterator::new(self.clone(), query, account)
    }
}
