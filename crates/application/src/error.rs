//! Application error types

use campus_domain::{DomainError, ValidationErrors};
use thiserror::Error;

use crate::ports::{HttpClientError, StoreError};

/// Application-level errors.
///
/// `Clone` so one fetch result can be handed to every caller sharing it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplicationError {
    /// The session is invalid or the server answered 401. The session has
    /// been cleared and the user sent to sign-in.
    #[error("session expired, please sign in again")]
    AuthExpired,

    /// The session's role lacks a capability, or the server answered 403.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Input was rejected before anything was sent.
    #[error("validation failed: {0}")]
    ClientValidation(ValidationErrors),

    /// The server rejected the write (409/422).
    #[error("{message}")]
    RemoteConflict {
        /// Submit-level message.
        message: String,
        /// Field-scoped messages, when the server named fields.
        fields: ValidationErrors,
    },

    /// The request did not complete in time.
    #[error("request timed out after {timeout_ms} ms")]
    NetworkTimeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The server failed (5xx).
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status.
        status: u16,
        /// Message from the body, or a generic one.
        message: String,
    },

    /// Too many attempts. Retry is blocked until the countdown elapses.
    #[error("too many attempts{}", retry_hint(.retry_after_secs))]
    RateLimited {
        /// Seconds to wait, when known.
        retry_after_secs: Option<u64>,
    },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request never reached the server.
    #[error("network error: {0}")]
    Transport(String),

    /// The response could not be interpreted.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The same labelled mutation is already in flight.
    #[error("already submitting: {0}")]
    DuplicateSubmit(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A domain validation error occurred.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}

#[allow(clippy::ref_option)]
fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs.map_or_else(String::new, |secs| format!(", retry in {secs} s"))
}

impl ApplicationError {
    /// Returns true for failures worth retrying unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout { .. } | Self::ServerError { .. } | Self::Transport(_)
        )
    }

    /// Returns true for errors shown inline next to form fields.
    #[must_use]
    pub const fn is_field_scoped(&self) -> bool {
        matches!(self, Self::ClientValidation(_) | Self::RemoteConflict { .. })
    }

    /// Field errors carried by validation or conflict errors.
    #[must_use]
    pub const fn field_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::ClientValidation(fields) | Self::RemoteConflict { fields, .. } => Some(fields),
            _ => None,
        }
    }
}

impl From<HttpClientError> for ApplicationError {
    fn from(error: HttpClientError) -> Self {
        match error {
            HttpClientError::Timeout { timeout_ms } => Self::NetworkTimeout { timeout_ms },
            HttpClientError::Cancelled => Self::Cancelled,
            HttpClientError::InvalidUrl(msg) | HttpClientError::InvalidBody(msg) => {
                Self::Decode(msg)
            }
            HttpClientError::ConnectionFailed(msg) | HttpClientError::Other(msg) => {
                Self::Transport(msg)
            }
        }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Result type alias for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
