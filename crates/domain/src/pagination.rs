//! Server pagination metadata and page-overflow detection.

use serde::{Deserialize, Serialize};

/// Pagination block returned with every list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Page the server actually returned.
    #[serde(default)]
    pub current_page: u32,
    /// Number of pages for the query. Zero for an empty result set.
    #[serde(default)]
    pub total_pages: u32,
    /// Number of matching records. Some endpoints call this `totalCount`.
    #[serde(default, alias = "totalCount")]
    pub total_records: u64,
    /// Whether a next page exists.
    #[serde(default)]
    pub has_next: bool,
    /// Whether a previous page exists.
    #[serde(default)]
    pub has_prev: bool,
}

impl Pagination {
    /// Returns the page a client should navigate to instead of `requested`,
    /// or `None` when `requested` is within range.
    ///
    /// An empty result set (`total_pages == 0`) never needs a correction;
    /// redirecting to page 0 would loop forever.
    #[must_use]
    pub const fn corrected_page(&self, requested: u32) -> Option<u32> {
        if self.total_pages > 0 && requested > self.total_pages {
            Some(self.total_pages)
        } else {
            None
        }
    }

    /// Returns true if the result set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_pages == 0
    }
}

/// A typed list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub data: Vec<T>,
    /// Pagination metadata, absent on unpaginated endpoints.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl<T> Page<T> {
    /// Returns the number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if this page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
