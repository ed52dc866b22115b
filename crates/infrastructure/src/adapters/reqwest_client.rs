//! HTTP Client implementation using reqwest.
//!
//! This adapter implements the `HttpClient` port using the reqwest library.
//! Request paths are resolved against the configured base URL.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use campus_application::ports::{HttpClient, HttpClientError};
use campus_domain::{ApiRequest, ApiResponse, HttpMethod};
use reqwest::{Client, Method, Url};
use tracing::debug;

/// Timeout applied when a request carries none.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client implementation using reqwest.
///
/// Wraps `reqwest::Client` and implements the `HttpClient` port from the
/// application layer. Non-2xx statuses are returned as responses; only
/// transport failures become errors.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
    base_url: String,
}

impl ReqwestHttpClient {
    /// Creates a client for the backend at `base_url`.
    ///
    /// Default configuration:
    /// - Follow redirects: up to 10
    /// - TLS verification: enabled
    /// - User-Agent: "Campus/<version>"
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL or the client
    /// cannot be created.
    pub fn new(base_url: &str) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .user_agent(concat!("Campus/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| HttpClientError::Other(e.to_string()))?;

        Self::with_client(client, base_url)
    }

    /// Creates a client with a custom reqwest client.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, HttpClientError> {
        Url::parse(base_url).map_err(|e| HttpClientError::InvalidUrl(format!("{e}: {base_url}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Converts domain `HttpMethod` to reqwest `Method`.
    const fn to_reqwest_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    /// Builds the absolute URL of `request`, query string included.
    fn url_for(&self, request: &ApiRequest) -> Result<Url, HttpClientError> {
        let path = if request.path.starts_with('/') {
            request.path.clone()
        } else {
            format!("/{}", request.path)
        };
        let mut url = format!("{}{path}", self.base_url);

        if !request.query.is_empty() {
            let query = serde_urlencoded::to_string(&request.query)
                .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }

        Url::parse(&url).map_err(|e| HttpClientError::InvalidUrl(format!("{e}: {url}")))
    }

    /// Maps reqwest errors to the port's `HttpClientError`.
    fn map_error(error: &reqwest::Error, timeout_ms: u64) -> HttpClientError {
        if error.is_timeout() {
            return HttpClientError::Timeout { timeout_ms };
        }
        if error.is_connect() {
            let host = error
                .url()
                .and_then(Url::host_str)
                .unwrap_or("unknown")
                .to_string();
            return HttpClientError::ConnectionFailed(format!("{host}: {error}"));
        }
        if error.is_body() || error.is_builder() {
            return HttpClientError::InvalidBody(error.to_string());
        }
        HttpClientError::Other(error.to_string())
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute(
        &self,
        request: &ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, HttpClientError>> + Send + '_>> {
        let url = self.url_for(request);
        let method = request.method;
        let headers = request.headers.clone();
        let body = request.body.clone();
        let timeout = request.timeout.unwrap_or(FALLBACK_TIMEOUT);
        let request_id = request.id;

        Box::pin(async move {
            let url = url?;
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            debug!(%request_id, %method, %url, "sending request");

            let mut builder = self
                .client
                .request(Self::to_reqwest_method(method), url)
                .timeout(timeout);

            for (name, value) in &headers {
                builder = builder.header(name, value);
            }

            if let Some(body) = &body {
                let bytes =
                    serde_json::to_vec(body).map_err(|e| HttpClientError::InvalidBody(e.to_string()))?;
                let has_content_type = headers
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
                if !has_content_type {
                    builder = builder.header("Content-Type", "application/json");
                }
                builder = builder.body(bytes);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| Self::map_error(&e, timeout_ms))?;

            let status = response.status().as_u16();
            let response_headers: HashMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();

            let body_bytes = response
                .bytes()
                .await
                .map_err(|e| Self::map_error(&e, timeout_ms))?
                .to_vec();

            debug!(%request_id, status, bytes = body_bytes.len(), "response received");
            Ok(ApiResponse::new(status, response_headers, body_bytes))
        })
    }
}
