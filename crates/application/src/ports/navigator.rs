//! Navigation port.
//!
//! The sync core never renders anything; it asks the UI layer to move.

use campus_domain::CacheKey;

/// A navigation the core requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Go to the sign-in surface.
    SignIn,
    /// Replace the current list location with this key (redirect, not push).
    Redirect(CacheKey),
}

/// Port through which the core asks the UI to navigate.
pub trait Navigator: Send + Sync {
    /// Performs or schedules `navigation`.
    fn navigate(&self, navigation: Navigation);
}
