//! Query caching.
//!
//! [`QueryCache`] holds server data by [`CacheKey`] with stale-while-revalidate
//! reads and per-key fetch deduplication. [`BoundedCache`] is the separate
//! fixed-capacity FIFO namespace for manually stored values.

mod bounded;
mod query_cache;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use campus_domain::CacheKey;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ApplicationResult;

pub use bounded::BoundedCache;
pub use query_cache::{CacheSnapshot, QueryCache};

/// Source of fresh values for the query cache.
///
/// The returned future must not borrow `key`.
pub trait Fetcher: Send + Sync {
    /// Fetches the current server value for `key`.
    fn fetch(
        &self,
        key: &CacheKey,
    ) -> Pin<Box<dyn Future<Output = ApplicationResult<Value>> + Send + '_>>;
}

/// A cached value and its freshness metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Cached payload.
    pub value: Value,
    /// When the payload was written.
    pub fetched_at: DateTime<Utc>,
    /// Age after which the payload is stale.
    pub ttl: Duration,
    /// Set when the entry was explicitly invalidated.
    pub invalidated: bool,
}

impl CacheEntry {
    /// A fresh entry written at `now`.
    #[must_use]
    pub const fn fresh(value: Value, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: now,
            ttl,
            invalidated: false,
        }
    }

    /// Returns true if the entry was invalidated or is older than its ttl.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.invalidated
            || (now - self.fetched_at)
                .to_std()
                .is_ok_and(|age| age > self.ttl)
    }
}
