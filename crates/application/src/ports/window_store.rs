//! Persisted rate-limit window port.

use async_trait::async_trait;
use campus_domain::RateLimitWindow;

use super::StoreError;

/// Storage for rate-limit windows, keyed by flow name (`"registration"`).
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Loads the window of `flow`, `None` if never saved.
    async fn load(&self, flow: &str) -> Result<Option<RateLimitWindow>, StoreError>;

    /// Saves the window of `flow`.
    ///
    /// # Errors
    /// Returns an error if the window cannot be written.
    async fn save(&self, flow: &str, window: &RateLimitWindow) -> Result<(), StoreError>;
}
