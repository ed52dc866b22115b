//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the sync core and external systems.
//! Each port is a trait that can be implemented by adapters in the
//! infrastructure layer.

mod clock;
mod credential_store;
mod http_client;
mod navigator;
mod window_store;

pub use clock::{Clock, ManualClock};
pub use credential_store::CredentialStore;
pub use http_client::{CancellationReceiver, CancellationToken, HttpClient, HttpClientError};
pub use navigator::{Navigation, Navigator};
pub use window_store::WindowStore;

/// Errors reported by persistence ports.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No location to persist to.
    #[error("no storage location available")]
    Unavailable,
}
