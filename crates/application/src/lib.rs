//! Campus Application - The resource synchronization core
//!
//! This crate holds the client-side machinery that keeps server data in
//! step with what the user sees: session guarding, the query cache,
//! optimistic mutations, pagination correction and submission throttling.
//! Everything that touches the outside world goes through [`ports`].

pub mod api;
pub mod auth;
pub mod cache;
pub mod context;
pub mod error;
pub mod mutation;
pub mod pagination;
pub mod ports;
pub mod rate_limiter;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use auth::{AuthGuard, AuthState, TokenResolver};
pub use cache::{BoundedCache, CacheEntry, CacheSnapshot, Fetcher, QueryCache};
pub use context::{ListOutcome, SyncContext, SyncPorts};
pub use error::{ApplicationError, ApplicationResult};
pub use mutation::{Mutation, MutationCoordinator, Patch, Settle, identity};
pub use pagination::PaginationReconciler;
pub use ports::{
    CancellationReceiver, CancellationToken, Clock, CredentialStore, HttpClient,
    HttpClientError, ManualClock, Navigation, Navigator, StoreError, WindowStore,
};
pub use rate_limiter::RateLimiter;
