//! Composition root of the sync core.
//!
//! [`SyncContext`] is built once at start-up from the adapters in
//! [`SyncPorts`]. It owns the session guard, the API client, the query cache
//! and the mutation coordinator, and wires the expiry path to clear the
//! cache.

use std::collections::HashMap;
use std::sync::Arc;

use campus_domain::{
    ApiRequest, CacheKey, Role, Session, StoredCredential, SyncSettings, Token, UserId,
    ValidationErrors,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::info;

use crate::api::ApiClient;
use crate::auth::AuthGuard;
use crate::cache::QueryCache;
use crate::error::{ApplicationError, ApplicationResult};
use crate::mutation::MutationCoordinator;
use crate::pagination::PaginationReconciler;
use crate::ports::{Clock, CredentialStore, HttpClient, Navigator, WindowStore};
use crate::rate_limiter::RateLimiter;

/// Adapters the sync core runs on.
#[derive(Clone)]
pub struct SyncPorts {
    /// HTTP transport.
    pub http: Arc<dyn HttpClient>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Persisted credential.
    pub credentials: Arc<dyn CredentialStore>,
    /// Persisted rate-limit windows.
    pub windows: Arc<dyn WindowStore>,
    /// UI navigation.
    pub navigator: Arc<dyn Navigator>,
}

/// Result of reading a list page.
#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome {
    /// The page to render.
    Ready(Value),
    /// The requested page was out of range; a redirect to this key was
    /// requested instead.
    Redirect(CacheKey),
}

/// The sync core, fully wired.
pub struct SyncContext {
    settings: SyncSettings,
    guard: Arc<AuthGuard>,
    api: Arc<ApiClient>,
    cache: QueryCache,
    mutations: MutationCoordinator,
    pagination: PaginationReconciler,
    clock: Arc<dyn Clock>,
    windows: Arc<dyn WindowStore>,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl SyncContext {
    /// Wires the core. Nothing is loaded until [`Self::restore`].
    pub fn new(settings: SyncSettings, ports: SyncPorts) -> Self {
        let guard = Arc::new(AuthGuard::new(ports.credentials, Arc::clone(&ports.navigator)));
        let api = Arc::new(ApiClient::new(
            ports.http,
            Arc::clone(&guard),
            settings.api.clone(),
        ));
        let cache = QueryCache::new(api.clone(), Arc::clone(&ports.clock), &settings.cache);
        guard.on_expire(cache.clear_hook());

        Self {
            mutations: MutationCoordinator::new(cache.clone()),
            pagination: PaginationReconciler::new(ports.navigator),
            settings,
            guard,
            api,
            cache,
            clock: ports.clock,
            windows: ports.windows,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Settings the core was built with.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Session guard.
    #[must_use]
    pub fn guard(&self) -> &AuthGuard {
        &self.guard
    }

    /// REST client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Query cache.
    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Mutation coordinator.
    #[must_use]
    pub const fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    /// Rebuilds the session from the persisted credential.
    pub async fn restore(&self) -> bool {
        self.guard.restore().await
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `ClientValidation` for blank input (nothing is sent),
    /// `RemoteConflict` for rejected credentials and `Decode` when the
    /// response carries no usable token or user.
    pub async fn sign_in(&self, email: &str, password: &str) -> ApplicationResult<Session> {
        let mut errors = ValidationErrors::new();
        errors.require(email.contains('@'), "email", "a valid email is required");
        errors.require(!password.is_empty(), "password", "password is required");
        errors.into_result().map_err(ApplicationError::ClientValidation)?;

        let body = json!({ "email": email.trim(), "password": password });
        let response = self
            .api
            .send_public(ApiRequest::post(&self.settings.api.login_path, body))
            .await?;

        let token = token_of(&response)
            .ok_or_else(|| ApplicationError::Decode("sign-in response has no token".to_string()))?;
        let (subject, role) = user_of(&response)
            .ok_or_else(|| ApplicationError::Decode("sign-in response has no user".to_string()))?;
        self.guard
            .sign_in(StoredCredential {
                subject,
                role,
                token,
            })
            .await?;
        Ok(self.guard.session())
    }

    /// Fetches the signed-in user and adopts its canonical subject and role.
    ///
    /// # Errors
    ///
    /// As [`ApiClient::send`]; `Decode` when the response has no user.
    pub async fn refresh_profile(&self) -> ApplicationResult<Value> {
        let profile = self
            .api
            .get(&self.settings.api.profile_path, Vec::new())
            .await?;
        let (subject, role) = user_of(&profile)
            .ok_or_else(|| ApplicationError::Decode("profile response has no user".to_string()))?;
        self.guard.refresh_user(subject, role).await?;
        Ok(profile)
    }

    /// Reads a list page through the cache and reconciles its pagination.
    ///
    /// # Errors
    ///
    /// As [`QueryCache::get`].
    pub async fn list(&self, key: &CacheKey) -> ApplicationResult<ListOutcome> {
        let value = self.cache.get(key).await?;
        Ok(self
            .pagination
            .reconcile_value(key, &value)
            .map_or(ListOutcome::Ready(value), ListOutcome::Redirect))
    }

    /// Reads a single record through the cache.
    ///
    /// # Errors
    ///
    /// As [`QueryCache::get`].
    pub async fn detail(&self, key: &CacheKey) -> ApplicationResult<Value> {
        self.cache.get(key).await
    }

    /// The rate limiter of `flow`, loaded on first use.
    pub async fn rate_limiter(&self, flow: &str) -> Arc<RateLimiter> {
        let existing = self.limiters.lock().get(flow).cloned();
        if let Some(limiter) = existing {
            return limiter;
        }
        let loaded = Arc::new(
            RateLimiter::load(
                flow,
                &self.settings.rate_limit,
                Arc::clone(&self.windows),
                Arc::clone(&self.clock),
            )
            .await,
        );
        Arc::clone(
            self.limiters
                .lock()
                .entry(flow.to_string())
                .or_insert(loaded),
        )
    }

    /// Ends the session. Cached data is dropped; no redirect is requested.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the persisted credential cannot be removed.
    pub async fn sign_out(&self) -> ApplicationResult<()> {
        self.guard.sign_out().await?;
        info!("sync context reset");
        Ok(())
    }
}

/// Candidate objects of a response: the body, `data`, `user`, `data.user`.
fn candidates(value: &Value) -> impl Iterator<Item = &Value> {
    [
        Some(value),
        value.get("data"),
        value.get("user"),
        value.get("data").and_then(|d| d.get("user")),
    ]
    .into_iter()
    .flatten()
}

fn token_of(value: &Value) -> Option<Token> {
    candidates(value).find_map(|object| {
        ["token", "accessToken", "access_token"]
            .iter()
            .find_map(|field| object.get(*field).and_then(Value::as_str))
            .and_then(Token::new)
    })
}

fn user_of(value: &Value) -> Option<(UserId, Role)> {
    candidates(value).find_map(|object| {
        let id = object.get("id").or_else(|| object.get("_id"))?;
        let id = match id {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let role = object.get("role").and_then(Value::as_str)?.parse::<Role>().ok()?;
        Some((UserId::new(id).ok()?, role))
    })
}
