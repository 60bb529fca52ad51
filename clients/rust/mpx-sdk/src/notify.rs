//! Change notifications
//!
//! mpx publishes object changes on a `notify` endpoint beside each data
//! service. [`NotificationListener::sync`] fetches the current head sequence
//! id; [`NotificationListener::listen`] long-polls for changes after the last
//! id seen. Notifications only reference objects, so changed objects are
//! re-fetched through the listener's [`DataObjectFactory`].
//!
//! Sequence ids age out of the server's retention window (about a week). A
//! listen on an expired id fails with [`Error::NotificationExpired`] and the
//! listener forgets its id, so the caller has to `sync()` again.

use crate::error::{Error, Result};
use crate::factory::{DataObject, DataObjectFactory};
use crate::service::{join_path, Account};
use futures::Stream;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Schema version of the notify endpoint
const NOTIFY_SCHEMA: &str = "1.10";

/// Kind of change a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMethod {
    Post,
    Put,
    Delete,
}

impl NotificationMethod {
    fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_lowercase().as_str() {
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
        }
    }
}

/// The object a notification refers to
#[derive(Debug, Clone)]
pub enum NotificationEntry<T> {
    /// Current state of the object, re-fetched after the notification
    Loaded(T),
    /// Deleted or foreign-typed object, as sent by the server
    Reference(Value),
}

/// One change event
#[derive(Debug, Clone)]
pub struct Notification<T> {
    /// Sequence id
    pub id: i64,
    pub method: Option<NotificationMethod>,
    pub object_type: Option<String>,
    pub entry: Option<NotificationEntry<T>>,
}

impl<T> Notification<T> {
    /// A sync marker only carries a sequence id
    pub fn is_sync(&self) -> bool {
        self.method.is_none() && self.object_type.is_none() && self.entry.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    id: i64,
    #[serde(default)]
    method: Option<String>,
    #[serde(rename = "type", default)]
    object_type: Option<String>,
    #[serde(default)]
    entry: Option<Value>,
}

/// Long-polling listener for one data service's notifications
pub struct NotificationListener<T> {
    factory: DataObjectFactory<T>,
    client_id: String,
    account: Option<Account>,
    last_id: Mutex<Option<i64>>,
}

impl<T: DataObject> NotificationListener<T> {
    /// `client_id` identifies this consumer to mpx in its logs
    pub fn new(factory: DataObjectFactory<T>, client_id: impl Into<String>) -> Self {
        Self {
            factory,
            client_id: client_id.into(),
            account: None,
            last_id: Mutex::new(None),
        }
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    /// Start from a sequence id persisted elsewhere
    pub fn with_last_id(self, id: i64) -> Self {
        *self.last_id.lock() = Some(id);
        self
    }

    /// Last sequence id seen, if any
    pub fn last_id(&self) -> Option<i64> {
        *self.last_id.lock()
    }

    /// Forget the sequence id
    pub fn reset(&self) {
        *self.last_id.lock() = None;
    }

    async fn request(&self, params: &[(&str, String)]) -> Result<Vec<RawNotification>> {
        let base = self.factory.base_url(self.account.as_ref()).await?;
        let url = join_path(&base, "notify")?;

        let mut query: Vec<(&str, String)> = vec![
            ("clientId", self.client_id.clone()),
            ("form", "cjson".to_string()),
            ("schema", NOTIFY_SCHEMA.to_string()),
        ];
        query.extend(params.iter().cloned());

        let response = self.factory.client().get(url, &query).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Fetch the current head sequence id without replaying any backlog
    pub async fn sync(&self) -> Result<i64> {
        let notifications = self.request(&[("block", "false".to_string())]).await?;
        let id = notifications
            .iter()
            .map(|n| n.id)
            .max()
            .ok_or_else(|| Error::InvalidResponse("sync returned no sequence id".into()))?;

        *self.last_id.lock() = Some(id);
        info!(service = %self.factory.service().name, id, "Synchronized notification sequence");
        Ok(id)
    }

    /// Alias of [`NotificationListener::sync`]
    pub async fn fetch_latest_id(&self) -> Result<i64> {
        self.sync().await
    }

    /// Wait for notifications after the last id seen
    pub async fn listen(&self) -> Result<Vec<Notification<T>>> {
        let since = self.last_id().ok_or(Error::NotSynced)?;
        self.listen_since(since).await
    }

    /// Wait for notifications after `since`.
    ///
    /// The server holds the request open until something changes or its own
    /// timeout passes. Dropping the future abandons the poll without touching
    /// the session's token.
    pub async fn listen_since(&self, since: i64) -> Result<Vec<Notification<T>>> {
        let params = [
            ("since", since.to_string()),
            ("block", "true".to_string()),
            ("filter", self.factory.service().object_type.to_string()),
        ];

        let raw = match self.request(&params).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                let mut last = self.last_id.lock();
                if *last == Some(since) {
                    *last = None;
                }
                return Err(Error::NotificationExpired { since });
            }
            Err(e) => return Err(e),
        };

        debug!(since, count = raw.len(), "Received notifications");

        let mut notifications = Vec::with_capacity(raw.len());
        for n in raw {
            notifications.push(self.resolve(n).await?);
        }

        if let Some(max) = notifications.iter().map(|n| n.id).max() {
            let mut last = self.last_id.lock();
            if last.map_or(true, |id| max > id) {
                *last = Some(max);
            }
        }

        Ok(notifications)
    }

    async fn resolve(&self, raw: RawNotification) -> Result<Notification<T>> {
        let method = raw.method.as_deref().and_then(NotificationMethod::parse);
        let recognized = raw.object_type.as_deref() == Some(self.factory.service().object_type);

        let entry = match raw.entry {
            None => None,
            Some(entry) if recognized && method != Some(NotificationMethod::Delete) => {
                let id = entry.get("id").and_then(Value::as_str).map(str::to_string);
                match id {
                    Some(id) => match self.factory.load(&id, self.account.as_ref()).await {
                        Ok(object) => Some(NotificationEntry::Loaded(object)),
                        // Deleted again since the notification was written
                        Err(e) if e.is_not_found() => Some(NotificationEntry::Reference(entry)),
                        Err(e) => return Err(e),
                    },
                    None => Some(NotificationEntry::Reference(entry)),
                }
            }
            Some(entry) => Some(NotificationEntry::Reference(entry)),
        };

        Ok(Notification {
            id: raw.id,
            method,
            object_type: raw.object_type,
            entry,
        })
    }

    /// Listen continuously, syncing first if no id is held.
    ///
    /// The stream ends after the first error, including an expired id.
    pub fn stream(&self) -> impl Stream<Item = Result<Notification<T>>> + '_ {
        let batches = futures::stream::try_unfold(self, |listener| async move {
            if listener.last_id().is_none() {
                listener.sync().await?;
            }
            let batch = listener.listen().await?;
            Ok::<_, Error>(Some((batch, listener)))
        });

        futures::StreamExt::flat_map(batches, |batch| {
            let items: Vec<Result<Notification<T>>> = match batch {
                Ok(batch) => batch.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures::stream::iter(items)
        })
    }
}

impl<T> std::fmt::Debug for NotificationListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationListener")
            .field("service", &self.factory.service().name)
            .field("client_id", &self.client_id)
            .field("last_id", &*self.last_id.lock())
            .finish()
    }
}
