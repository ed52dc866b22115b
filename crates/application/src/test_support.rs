//! In-memory port implementations shared by the unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use campus_domain::{
    ApiRequest, ApiResponse, CacheKey, RateLimitWindow, ResourceType, Role, StoredCredential,
    Token, UserId,
};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::watch;

use crate::cache::Fetcher;
use crate::error::ApplicationResult;
use crate::ports::{
    CredentialStore, HttpClient, HttpClientError, Navigation, Navigator, StoreError, WindowStore,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn resource(name: &str) -> ResourceType {
    ResourceType::new(name).unwrap()
}

pub fn credential(role: Role) -> StoredCredential {
    StoredCredential {
        subject: UserId::new("user-1").unwrap(),
        role,
        token: Token::new("token-abc").unwrap(),
    }
}

/// A `{ data, pagination }` page of `count` items with ids `1..=count`.
pub fn list_page(count: u64) -> Value {
    let data: Vec<Value> = (1..=count)
        .map(|i| json!({ "id": i.to_string(), "title": format!("Item {i}"), "points": 10 }))
        .collect();
    json!({
        "data": data,
        "pagination": {
            "currentPage": 1,
            "totalPages": 1,
            "totalRecords": count,
            "hasNext": false,
            "hasPrev": false
        }
    })
}

#[derive(Default)]
pub struct MemoryCredentials {
    pub stored: Mutex<Option<StoredCredential>>,
    pub clears: AtomicUsize,
}

impl MemoryCredentials {
    pub fn with(credential: StoredCredential) -> Self {
        Self {
            stored: Mutex::new(Some(credential)),
            clears: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn load(&self) -> Result<Option<StoredCredential>, StoreError> {
        Ok(self.stored.lock().clone())
    }

    async fn save(&self, credential: &StoredCredential) -> Result<(), StoreError> {
        *self.stored.lock() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        *self.stored.lock() = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWindows {
    pub windows: Mutex<HashMap<String, RateLimitWindow>>,
    pub saves: AtomicUsize,
}

#[async_trait]
impl WindowStore for MemoryWindows {
    async fn load(&self, flow: &str) -> Result<Option<RateLimitWindow>, StoreError> {
        Ok(self.windows.lock().get(flow).cloned())
    }

    async fn save(&self, flow: &str, window: &RateLimitWindow) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().insert(flow.to_string(), window.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub events: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn events(&self) -> Vec<Navigation> {
        self.events.lock().clone()
    }

    pub fn sign_in_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == Navigation::SignIn)
            .count()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, navigation: Navigation) {
        self.events.lock().push(navigation);
    }
}

/// HTTP client answering from per-route queues; unknown routes get 404.
#[derive(Default)]
pub struct MockHttp {
    routes: Mutex<HashMap<String, VecDeque<Result<ApiResponse, HttpClientError>>>>,
    pub requests: Mutex<Vec<ApiRequest>>,
}

impl MockHttp {
    pub fn respond(&self, method: &str, path: &str, response: Result<ApiResponse, HttpClientError>) {
        self.routes
            .lock()
            .entry(format!("{method} {path}"))
            .or_default()
            .push_back(response);
    }

    pub fn respond_json(&self, method: &str, path: &str, status: u16, body: &Value) {
        self.respond(method, path, Ok(ApiResponse::json(status, body)));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<ApiRequest> {
        self.requests.lock().last().cloned()
    }
}

impl HttpClient for MockHttp {
    fn execute(
        &self,
        request: &ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, HttpClientError>> + Send + '_>> {
        self.requests.lock().push(request.clone());
        let route = format!("{} {}", request.method, request.path);
        let result = self
            .routes
            .lock()
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(ApiResponse::json(404, &json!({ "message": "no route" }))));
        Box::pin(async move { result })
    }
}

/// Fetcher that counts calls and can be held until released.
pub struct GatedFetcher {
    pub calls: AtomicUsize,
    values: Mutex<HashMap<CacheKey, VecDeque<ApplicationResult<Value>>>>,
    fallback: Value,
    gate: watch::Sender<bool>,
}

impl GatedFetcher {
    pub fn new(fallback: Value) -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            values: Mutex::new(HashMap::new()),
            fallback,
            gate,
        })
    }

    pub fn queue(&self, key: &CacheKey, value: ApplicationResult<Value>) {
        self.values
            .lock()
            .entry(key.clone())
            .or_default()
            .push_back(value);
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for GatedFetcher {
    fn fetch(
        &self,
        key: &CacheKey,
    ) -> Pin<Box<dyn Future<Output = ApplicationResult<Value>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.values.lock().get_mut(key).and_then(VecDeque::pop_front);
        let result = queued.unwrap_or_else(|| Ok(self.fallback.clone()));
        let mut gate = self.gate.subscribe();
        Box::pin(async move {
            let _ = gate.wait_for(|open| *open).await;
            result
        })
    }
}
