//! REST client for the sync core.
//!
//! [`ApiClient`] wraps an [`HttpClient`] port with the session rules:
//! protected calls carry the bearer token, run inside the session's
//! cancellation scope and route every 401 through the expiry path.

mod response;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use campus_domain::{ApiRequest, ApiResponse, ApiSettings, CacheKey, Download};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthGuard;
use crate::cache::Fetcher;
use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::HttpClient;

pub use response::{error_for_status, interpret};

/// Authenticated access to the REST backend.
pub struct ApiClient {
    http: Arc<dyn HttpClient>,
    guard: Arc<AuthGuard>,
    settings: ApiSettings,
}

impl ApiClient {
    /// Creates a client sending through `http` on behalf of `guard`'s session.
    pub fn new(http: Arc<dyn HttpClient>, guard: Arc<AuthGuard>, settings: ApiSettings) -> Self {
        Self {
            http,
            guard,
            settings,
        }
    }

    /// Endpoint settings.
    #[must_use]
    pub const fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Sends a protected request and interprets the JSON response.
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` for an invalid session or a 401 (after the
    /// expiry path ran), otherwise the error matching the status.
    pub async fn send(&self, request: ApiRequest) -> ApplicationResult<Value> {
        let response = self.send_raw(request).await?;
        interpret(&response)
    }

    /// Sends a request that needs no session, such as sign-in.
    ///
    /// A 401 here means rejected credentials and maps to `RemoteConflict`.
    ///
    /// # Errors
    ///
    /// Returns the error matching the status or transport failure.
    pub async fn send_public(&self, request: ApiRequest) -> ApplicationResult<Value> {
        let request = self.prepare(request);
        debug!(request_id = %request.id, method = %request.method, path = %request.path, "public request");
        let response = self.http.execute(&request).await?;
        interpret(&response)
    }

    async fn send_raw(&self, request: ApiRequest) -> ApplicationResult<ApiResponse> {
        self.guard.guard().await?;
        let Some(token) = self.guard.resolver().resolve().await else {
            self.guard.expire().await;
            return Err(ApplicationError::AuthExpired);
        };
        let mut scope = self.guard.scope();
        let request = self
            .prepare(request)
            .with_header("Authorization", token.bearer_header());
        debug!(request_id = %request.id, method = %request.method, path = %request.path, "protected request");

        let response = tokio::select! {
            response = self.http.execute(&request) => response?,
            () = scope.cancelled() => {
                debug!(request_id = %request.id, "protected request abandoned, session ended");
                return Err(ApplicationError::AuthExpired);
            }
        };

        if response.status == 401 {
            warn!(request_id = %request.id, path = %request.path, "server rejected the session");
            self.guard.expire().await;
            return Err(ApplicationError::AuthExpired);
        }
        Ok(response)
    }

    fn prepare(&self, request: ApiRequest) -> ApiRequest {
        let id = request.id;
        let mut request = request.with_header("X-Request-Id", id.to_string());
        if request.timeout.is_none() {
            request.timeout = Some(self.settings.timeout());
        }
        request
    }

    /// GET `path` with `query`.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn get(&self, path: &str, query: Vec<(String, String)>) -> ApplicationResult<Value> {
        self.send(ApiRequest::get(path).with_query(query)).await
    }

    /// POST `body` to `path`.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn post(&self, path: &str, body: Value) -> ApplicationResult<Value> {
        self.send(ApiRequest::post(path, body)).await
    }

    /// PUT `body` to `path`.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn put(&self, path: &str, body: Value) -> ApplicationResult<Value> {
        self.send(ApiRequest::put(path, body)).await
    }

    /// PATCH `path` with `body`.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn patch(&self, path: &str, body: Value) -> ApplicationResult<Value> {
        self.send(ApiRequest::patch(path, body)).await
    }

    /// DELETE `path`. An empty success body yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn delete(&self, path: &str) -> ApplicationResult<Value> {
        self.send(ApiRequest::delete(path)).await
    }

    /// Fetches the value behind `key`.
    ///
    /// Detail responses wrapped as `{ data: T }` are unwrapped to `T`.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn fetch_key(&self, key: &CacheKey) -> ApplicationResult<Value> {
        let value = self.get(&key.path(), key.query_pairs()).await?;
        if key.is_detail() {
            Ok(unwrap_detail(value))
        } else {
            Ok(value)
        }
    }

    /// Downloads a binary file from a protected endpoint.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub async fn download(&self, path: &str, fallback_name: &str) -> ApplicationResult<Download> {
        let request = ApiRequest::get(path).with_timeout(self.settings.download_timeout());
        let response = self.send_raw(request).await?;
        if !response.is_success() {
            return Err(error_for_status(&response));
        }
        let disposition = response.header("content-disposition").map(str::to_string);
        Ok(Download::new(
            response.body,
            disposition.as_deref(),
            fallback_name,
        ))
    }
}

fn unwrap_detail(value: Value) -> Value {
    match value {
        Value::Object(mut object)
            if object.contains_key("data")
                && !object.contains_key("id")
                && !object.contains_key("_id") =>
        {
            object.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl Fetcher for ApiClient {
    fn fetch(
        &self,
        key: &CacheKey,
    ) -> Pin<Box<dyn Future<Output = ApplicationResult<Value>> + Send + '_>> {
        let key = key.clone();
        Box::pin(async move { self.fetch_key(&key).await })
    }
}
