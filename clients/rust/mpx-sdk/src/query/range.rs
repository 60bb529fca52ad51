//! Paging windows

use super::{QueryPart, QueryParts};
use crate::error::{Error, Result};
use std::fmt;

/// A 1-based, inclusive window of results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    start: u32,
    end: u32,
}

impl Range {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start < 1 {
            return Err(Error::InvalidQuery("range start is 1-based".into()));
        }
        if end < start {
            return Err(Error::InvalidQuery(format!("range end {} precedes start {}", end, start)));
        }
        Ok(Self { start, end })
    }

    /// The first `size` results
    pub fn first(size: u32) -> Result<Self> {
        Self::new(1, size)
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of results the window covers
    pub fn size(&self) -> u32 {
        self.end - self.start + 1
    }

    /// The window following a page that started at `start_index` and held
    /// `entry_count` results.
    ///
    /// Uses the count actually returned, not the requested size, so a short
    /// page is never skipped past.
    pub fn next_after(start_index: u32, entry_count: u32, items_per_page: u32) -> Result<Self> {
        let overflow = || {
            Error::InvalidResponse(format!(
                "page window overflows: startIndex {} entryCount {} itemsPerPage {}",
                start_index, entry_count, items_per_page
            ))
        };
        let start = start_index.checked_add(entry_count).ok_or_else(overflow)?;
        let end = start.checked_add(items_per_page).ok_or_else(overflow)?;
        Self::new(start, end.saturating_sub(1))
    }

    /// Every window still needed to reach `total_results`.
    ///
    /// Only an estimate: totals shift under concurrent writes, so this must not
    /// decide when paging stops.
    pub fn remaining(start_index: u32, entry_count: u32, items_per_page: u32, total_results: u32) -> Vec<Self> {
        let mut ranges = Vec::new();
        if items_per_page == 0 {
            return ranges;
        }

        let Some(mut start) = start_index.checked_add(entry_count) else {
            return ranges;
        };
        while start <= total_results {
            let end = start.saturating_add(items_per_page - 1).min(total_results);
            ranges.push(Self { start, end });
            match end.checked_add(1) {
                Some(next) => start = next,
                None => break,
            }
        }
        ranges
    }
}

impl Default for Range {
    fn default() -> Self {
        Self { start: 1, end: 100 }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl QueryPart for Range {
    fn query_parts(&self) -> QueryParts {
        let mut parts = QueryParts::new();
        parts.insert("range".to_string(), self.to_string());
        parts
    }
}
