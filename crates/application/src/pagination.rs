//! Correction of out-of-range page requests.

use std::sync::Arc;

use campus_domain::{CacheKey, Pagination};
use serde_json::Value;
use tracing::info;

use crate::ports::{Navigation, Navigator};

/// Redirects a list view whose requested page is past the last page.
///
/// Typical cause: the last item of the last page was deleted.
#[derive(Clone)]
pub struct PaginationReconciler {
    navigator: Arc<dyn Navigator>,
}

impl PaginationReconciler {
    /// Creates a reconciler that redirects through `navigator`.
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { navigator }
    }

    /// Compares the requested page of `key` with the server's pagination.
    ///
    /// When the page is out of range, requests a redirect to the same query
    /// on the last page and returns that key. An empty result set never
    /// redirects.
    pub fn reconcile(&self, key: &CacheKey, pagination: &Pagination) -> Option<CacheKey> {
        let page = pagination.corrected_page(key.page())?;
        let corrected = key.clone().with_page(page);
        info!(
            requested = key.page(),
            total_pages = pagination.total_pages,
            corrected = page,
            "page out of range, redirecting"
        );
        self.navigator
            .navigate(Navigation::Redirect(corrected.clone()));
        Some(corrected)
    }

    /// Like [`Self::reconcile`], reading the `pagination` block of a list
    /// response. Responses without one are never corrected.
    pub fn reconcile_value(&self, key: &CacheKey, response: &Value) -> Option<CacheKey> {
        let pagination = response
            .get("pagination")
            .and_then(|p| serde_json::from_value::<Pagination>(p.clone()).ok())?;
        self.reconcile(key, &pagination)
    }
}
