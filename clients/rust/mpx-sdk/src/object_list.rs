//! Paged result sets
//!
//! An [`ObjectList`] is one page of a query result. [`ObjectListIterator`]
//! walks a whole result set one page at a time, keeping only the current page
//! in memory. Paging stops at the first short page; `totalResults` is reported
//! but never trusted to end the walk, since it shifts under concurrent writes.

use crate::error::{Error, Result};
use crate::factory::{DataObject, DataObjectFactory};
use crate::query::{ObjectListQuery, Range};
use crate::service::Account;
use futures::Stream;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// Wire format of one page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObjectListPage<T> {
    pub start_index: Option<u32>,
    pub items_per_page: Option<u32>,
    pub entry_count: Option<u32>,
    pub total_results: Option<u32>,
    #[serde(default = "Vec::new")]
    pub entries: Vec<T>,
}

/// What a page needs to request the page after it
struct PageContext<T> {
    factory: DataObjectFactory<T>,
    query: ObjectListQuery,
    account: Option<Account>,
}

/// One page of a query result
pub struct ObjectList<T> {
    start_index: u32,
    items_per_page: u32,
    entry_count: u32,
    total_results: Option<u32>,
    entries: Vec<T>,
    context: Option<PageContext<T>>,
}

impl<T> ObjectList<T> {
    /// A page holding `entries`, without the context to fetch further pages
    pub fn new(start_index: u32, items_per_page: u32, entries: Vec<T>, total_results: Option<u32>) -> Self {
        Self {
            start_index,
            items_per_page,
            entry_count: entries.len() as u32,
            total_results,
            entries,
            context: None,
        }
    }

    pub(crate) fn from_page(page: ObjectListPage<T>, requested: Range) -> Self {
        let entry_count = page.entry_count.unwrap_or(page.entries.len() as u32);
        Self {
            start_index: page.start_index.unwrap_or(requested.start()),
            items_per_page: page.items_per_page.unwrap_or(requested.size()),
            entry_count,
            total_results: page.total_results,
            entries: page.entries,
            context: None,
        }
    }

    /// Attach the factory, query and account used to request following pages
    pub fn with_context(
        mut self,
        factory: DataObjectFactory<T>,
        query: ObjectListQuery,
        account: Option<Account>,
    ) -> Self {
        self.context = Some(PageContext {
            factory,
            query,
            account,
        });
        self
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }

    /// Entries returned in this page
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Server's estimate of the whole result size
    pub fn total_results(&self) -> Option<u32> {
        self.total_results
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<T> {
        self.entries
    }

    pub(crate) fn take_entries(&mut self) -> Vec<T> {
        std::mem::take(&mut self.entries)
    }

    /// True when this page was full, so another may follow.
    pub fn has_next(&self) -> bool {
        self.entry_count > 0 && self.entry_count >= self.items_per_page
    }

    /// The range of the following page
    pub fn next_range(&self) -> Result<Range> {
        Range::next_after(self.start_index, self.entry_count, self.items_per_page)
    }

    /// All ranges still needed to reach `totalResults`, for planning only
    pub fn estimated_remaining_ranges(&self) -> Vec<Range> {
        match self.total_results {
            Some(total) => Range::remaining(self.start_index, self.entry_count, self.items_per_page, total),
            None => Vec::new(),
        }
    }
}

impl<T: DataObject> ObjectList<T> {
    /// Request the following page, `None` when this one was the last
    pub async fn next_list(&self) -> Result<Option<ObjectList<T>>> {
        if !self.has_next() {
            return Ok(None);
        }

        let context = self
            .context
            .as_ref()
            .ok_or_else(|| Error::InvalidQuery("page has no factory to request the next page".into()))?;

        let range = self.next_range()?;
        debug!(range = %range, "Requesting next page");
        let query = context.query.clone().with_range(range);
        let next = context
            .factory
            .select(&query, context.account.as_ref())
            .await?;
        Ok(Some(next))
    }
}

impl<T> IntoIterator for ObjectList<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjectList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectList")
            .field("start_index", &self.start_index)
            .field("items_per_page", &self.items_per_page)
            .field("entry_count", &self.entry_count)
            .field("total_results", &self.total_results)
            .field("entries", &self.entries)
            .finish()
    }
}

/// Forward-only iteration over every page of a query
///
/// The first page is requested on first use. Each later page replaces the
/// previous one, so memory stays bounded by one page whatever the result size.
pub struct ObjectListIterator<T> {
    factory: DataObjectFactory<T>,
    query: ObjectListQuery,
    account: Option<Account>,
    position: usize,
    page: usize,
    list: Option<ObjectList<T>>,
    entries: std::vec::IntoIter<T>,
    finished: bool,
}

impl<T: DataObject> ObjectListIterator<T> {
    pub fn new(factory: DataObjectFactory<T>, query: ObjectListQuery, account: Option<Account>) -> Self {
        Self {
            factory,
            query,
            account,
            position: 0,
            page: 0,
            list: None,
            entries: Vec::new().into_iter(),
            finished: false,
        }
    }

    /// Logical 0-based position of the next item across all pages
    pub fn position(&self) -> usize {
        self.position
    }

    /// Index of the page currently held
    pub fn page(&self) -> usize {
        self.page
    }

    /// `totalResults` of the current page, once one has been fetched
    pub fn total_results(&self) -> Option<u32> {
        self.list.as_ref().and_then(|l| l.total_results())
    }

    fn hold(&mut self, mut list: ObjectList<T>) {
        self.entries = list.take_entries().into_iter();
        self.list = Some(list);
    }

    /// Next object, `None` once the result set is exhausted
    pub async fn next(&mut self) -> Result<Option<T>> {
        if self.finished {
            return Ok(None);
        }

        if self.list.is_none() {
            let first = self
                .factory
                .select(&self.query, self.account.as_ref())
                .await?;
            self.hold(first);
        }

        loop {
            let Some(list) = self.list.as_ref() else {
                self.finished = true;
                return Ok(None);
            };

            let per_page = list.items_per_page() as usize;
            if per_page == 0 {
                self.finished = true;
                return Ok(None);
            }

            if self.position / per_page <= self.page {
                break;
            }

            let next = list.next_list().await?;
            match next {
                Some(next) => {
                    self.page += 1;
                    self.hold(next);
                }
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            }
        }

        match self.entries.next() {
            Some(item) => {
                self.position += 1;
                Ok(Some(item))
            }
            None => {
                // A short page is the end of the data
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Skip forward so the next item returned is at `position`
    pub async fn advance_to(&mut self, position: usize) -> Result<()> {
        if position < self.position {
            return Err(Error::InvalidQuery(format!(
                "cannot rewind from position {} to {}",
                self.position, position
            )));
        }

        while self.position < position {
            if self.next().await?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Collect every remaining object
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Consume the iterator as a stream
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send {
        futures::stream::try_unfold(self, |mut iter| async move {
            Ok(iter.next().await?.map(|item| (item, iter)))
        })
    }
}

impl<T> fmt::Debug for ObjectListIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectListIterator")
            .field("service", &self.factory.service().name)
            .field("position", &self.position)
            .field("page", &self.page)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
