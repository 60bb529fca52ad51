//! Query builders for mpx object lists
//!
//! Each builder renders to query-string parameters. [`ObjectListQuery`]
//! combines any number of filters with exactly one sort and one range.
//!
//! ```rust
//! use mpx_sdk::query::{ByFields, ObjectListQuery, Range, Sort};
//!
//! let query = ObjectListQuery::new()
//!     .add(ByFields::new().field("title", "Most Excellent Video"))
//!     .with_sort(Sort::by("id"))
//!     .with_range(Range::new(1, 10).unwrap());
//!
//! let parts = query.to_query_parts();
//! assert_eq!(parts["byTitle"], "Most Excellent Video");
//! assert_eq!(parts["range"], "1-10");
//! ```

mod fields;
mod range;
mod sort;
mod term;

pub use fields::{ByFields, Fields};
pub use range::Range;
pub use sort::{Sort, SortOrder};
pub use term::{escape_value, MatchType, Operator, QQuery, Term, TermGroup};

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Query-string parameters in insertion order
pub type QueryParts = IndexMap<String, String>;

/// A fragment of a query rendering to query-string parameters
pub trait QueryPart: fmt::Debug + Send + Sync {
    fn query_parts(&self) -> QueryParts;
}

/// Filters, sort and range for one object-list request
#[derive(Debug, Clone, Default)]
pub struct ObjectListQuery {
    filters: Vec<Arc<dyn QueryPart>>,
    sort: Option<Sort>,
    range: Option<Range>,
}

impl ObjectListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter. On a parameter collision the filter added last wins.
    pub fn add(mut self, part: impl QueryPart + 'static) -> Self {
        self.filters.push(Arc::new(part));
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    /// The sort in effect, `id` ascending unless set
    pub fn sort(&self) -> Sort {
        self.sort.clone().unwrap_or_default()
    }

    /// The range in effect, `1-100` unless set
    pub fn range(&self) -> Range {
        self.range.unwrap_or_default()
    }

    pub fn has_range(&self) -> bool {
        self.range.is_some()
    }

    /// Flatten filters, sort and range into one parameter map
    pub fn to_query_parts(&self) -> QueryParts {
        let mut parts = QueryParts::new();
        for filter in &self.filters {
            parts.extend(filter.query_parts());
        }
        parts.extend(self.sort().query_parts());
        parts.extend(self.range().query_parts());
        parts
    }
}
