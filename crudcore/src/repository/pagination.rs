//! Query and result types for paginated reads
//!
//! # Example
//!
//! ```rust
//! use crudcore::config::RepositoryConfig;
//! use crudcore::repository::GetManyQuery;
//!
//! let settings = RepositoryConfig::default();
//! let query = GetManyQuery::new()
//!     .with_filter("status:eq:Active")
//!     .with_sort("age:desc")
//!     .with_page(0)
//!     .with_page_size(5000);
//!
//! assert_eq!(query.page_number(), 1);
//! assert_eq!(query.items_per_page(&settings), settings.max_page_size);
//! ```

use serde::{Deserialize, Serialize};

use crate::config::RepositoryConfig;
use crate::query::Sorting;

/// Offset/limit window over a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: usize,
    /// Maximum number of results to return
    pub limit: usize,
}

impl Pagination {
    /// Create new pagination parameters
    #[must_use]
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Window for a 1-indexed page number
    ///
    /// ```rust
    /// use crudcore::repository::Pagination;
    ///
    /// let page3 = Pagination::page(3, 20);
    /// assert_eq!(page3.offset, 40);
    /// assert_eq!(page3.limit, 20);
    /// ```
    #[must_use]
    pub const fn page(page_number: usize, page_size: usize) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }

    /// Apply the window to an ordered list
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

/// Caller request for [`get_many_and_count`](crate::repository::ReadOnlyRepository::get_many_and_count)
///
/// Every part is optional: no filter matches everything, no sort falls back to
/// the caller's default sort, and page values are clamped against the
/// repository settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetManyQuery {
    /// Filter string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Sort string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// Page number (1-indexed). None defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,

    /// Number of items per page. None defaults to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
}

impl GetManyQuery {
    /// Create an empty query
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter string
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set the sort string
    #[must_use]
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Set the page number
    #[must_use]
    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Effective page number, never below 1
    pub fn page_number(&self) -> usize {
        match self.page {
            Some(page) if page >= 1 => usize::try_from(page).unwrap_or(usize::MAX),
            _ => 1,
        }
    }

    /// Effective page size
    ///
    /// Values below 1 fall back to the configured default; values above the
    /// configured maximum are clamped to it.
    pub fn items_per_page(&self, settings: &RepositoryConfig) -> usize {
        match self.page_size {
            Some(size) if size >= 1 => {
                usize::try_from(size).map_or(settings.max_page_size, |size| size.min(settings.max_page_size))
            }
            _ => settings.default_page_size.min(settings.max_page_size),
        }
    }

    /// Effective offset/limit window
    pub fn pagination(&self, settings: &RepositoryConfig) -> Pagination {
        Pagination::page(self.page_number(), self.items_per_page(settings))
    }

    /// Filter string, `None` when absent or blank
    pub fn filter_str(&self) -> Option<&str> {
        self.filter.as_deref().filter(|f| !f.trim().is_empty())
    }

    /// Sort string, `None` when absent or blank
    pub fn sort_str(&self) -> Option<&str> {
        self.sort.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// One page of results plus the size of the whole matching set
///
/// Serializes with camelCase keys:
///
/// ```json
/// { "items": [...], "count": 42, "pageNumber": 2, "pageSize": 10, "sorting": "age:desc" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetManyAndCountResult<T> {
    /// Entities on this page
    pub items: Vec<T>,
    /// Number of entities matching the filter across all pages
    pub count: usize,
    /// Page number (1-indexed)
    pub page_number: usize,
    /// Page size used
    pub page_size: usize,
    /// Sort that produced the order
    pub sorting: Sorting,
}

impl<T> GetManyAndCountResult<T> {
    /// Total number of pages, rounding up
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.count.div_ceil(self.page_size)
    }

    /// Whether a later page exists
    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages()
    }

    /// Whether an earlier page exists
    pub fn has_prev(&self) -> bool {
        self.page_number > 1
    }

    /// Whether this page holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Map the items, keeping the paging metadata
    ///
    /// Useful for turning entities into response DTOs.
    pub fn map<U, F>(self, f: F) -> GetManyAndCountResult<U>
    where
        F: FnMut(T) -> U,
    {
        GetManyAndCountResult {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
            page_number: self.page_number,
            page_size: self.page_size,
            sorting: self.sorting,
        }
    }
}
