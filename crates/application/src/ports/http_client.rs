//! HTTP Client port

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use campus_domain::{ApiRequest, ApiResponse};
use thiserror::Error;
use tokio::sync::watch;

/// Transport-level failures reported by an [`HttpClient`].
///
/// Non-2xx statuses are not errors at this level; they arrive as an
/// [`ApiResponse`] and are classified by the API client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpClientError {
    /// The request did not complete within its timeout.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The URL could not be built from the base URL and path.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request body could not be encoded.
    #[error("invalid body: {0}")]
    InvalidBody(String),

    /// The request was cancelled before completing.
    #[error("request cancelled")]
    Cancelled,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Port for executing HTTP requests.
///
/// This trait abstracts the HTTP client implementation, allowing
/// the application layer to be independent of specific HTTP libraries.
pub trait HttpClient: Send + Sync {
    /// Executes a request and returns the raw response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails due to network issues,
    /// timeout, or other transport problems.
    fn execute(
        &self,
        request: &ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, HttpClientError>> + Send + '_>>;
}

/// Sending half of a cancellation signal.
///
/// Cancelling is idempotent. Receivers created before or after the call all
/// observe it.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

/// Receiving half of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationReceiver {
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Creates a token and its first receiver.
    #[must_use]
    pub fn new() -> (Self, CancellationReceiver) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                sender: Arc::new(sender),
            },
            CancellationReceiver { receiver },
        )
    }

    /// Signals cancellation to every receiver.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns true once [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Creates another receiver for this token.
    #[must_use]
    pub fn receiver(&self) -> CancellationReceiver {
        CancellationReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl CancellationReceiver {
    /// Completes when the token is cancelled. Never completes if the token
    /// is dropped without being cancelled.
    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}
