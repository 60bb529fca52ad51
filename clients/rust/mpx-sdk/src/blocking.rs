//! Synchronous wrappers
//!
//! For callers without an async runtime. Each wrapper drives the async
//! implementation on a private single-threaded runtime, so the retry and
//! paging behaviour is identical. Do not use these from inside an async
//! context.

use crate::error::{Error, Result};
use crate::factory::{DataObject, DataObjectFactory};
use crate::object_list::{ObjectList, ObjectListIterator};
use crate::query::ObjectListQuery;
use crate::service::Account;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

fn build_runtime() -> Result<Arc<Runtime>> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("failed to start runtime: {}", e)))?;
    Ok(Arc::new(runtime))
}

/// Blocking counterpart of [`DataObjectFactory`]
pub struct BlockingFactory<T> {
    inner: DataObjectFactory<T>,
    runtime: Arc<Runtime>,
}

impl<T: DataObject> BlockingFactory<T> {
    pub fn new(inner: DataObjectFactory<T>) -> Result<Self> {
        Ok(Self {
            inner,
            runtime: build_runtime()?,
        })
    }

    pub fn load(&self, id: &str, account: Option<&Account>) -> Result<T> {
        self.runtime.block_on(self.inner.load(id, account))
    }

    pub fn select(&self, query: &ObjectListQuery, account: Option<&Account>) -> Result<ObjectList<T>> {
        self.runtime.block_on(self.inner.select(query, account))
    }

    /// Request the page after `list`
    pub fn next_list(&self, list: &ObjectList<T>) -> Result<Option<ObjectList<T>>> {
        self.runtime.block_on(list.next_list())
    }

    pub fn iter(&self, query: ObjectListQuery, account: Option<Account>) -> BlockingIterator<T> {
        BlockingIterator {
            inner: self.inner.iter(query, account),
            runtime: self.runtime.clone(),
            failed: false,
        }
    }
}

impl<T> fmt::Debug for BlockingFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingFactory")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

/// Blocking, forward-only iterator over every page of a query.
///
/// Yields `Err` at most once, then stops.
pub struct BlockingIterator<T> {
    inner: ObjectListIterator<T>,
    runtime: Arc<Runtime>,
    failed: bool,
}

impl<T: DataObject> BlockingIterator<T> {
    pub fn position(&self) -> usize {
        self.inner.position()
    }
}

impl<T: DataObject> Iterator for BlockingIterator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.runtime.block_on(self.inner.next()) {
            Ok(item) => item.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<T> fmt::Debug for BlockingIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingIterator")
            .field("inner", &self.inner)
            .field("failed", &self.failed)
            .finish()
    }
}
