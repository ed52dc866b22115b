//! Integration tests for the sync core on the file-backed adapters.
//!
//! The HTTP transport is scripted; persistence, navigation and settings go
//! through the real infrastructure implementations.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use campus_application::ports::{HttpClient, HttpClientError, Navigation};
use campus_application::{
    ApplicationError, AuthState, ListOutcome, ManualClock, Mutation, Patch, SyncContext, SyncPorts,
};
use campus_domain::{
    ApiRequest, ApiResponse, CacheKey, LimiterState, ResourceType, StorageSettings, SyncSettings,
};
use campus_infrastructure::{ChannelNavigator, FileCredentialStore, FileWindowStore};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;

/// Answers from per-route queues; unknown routes get 404.
#[derive(Default)]
struct ScriptedHttp {
    routes: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
    seen: Mutex<Vec<ApiRequest>>,
}

impl ScriptedHttp {
    fn reply(&self, route: &str, status: u16, body: &Value) {
        self.routes
            .lock()
            .entry(route.to_string())
            .or_default()
            .push_back(ApiResponse::json(status, body));
    }

    fn seen(&self) -> Vec<ApiRequest> {
        self.seen.lock().clone()
    }
}

impl HttpClient for ScriptedHttp {
    fn execute(
        &self,
        request: &ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, HttpClientError>> + Send + '_>> {
        self.seen.lock().push(request.clone());
        let route = format!("{} {}", request.method, request.path);
        let response = self
            .routes
            .lock()
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ApiResponse::json(404, &json!({ "message": "no route" })));
        Box::pin(async move { Ok(response) })
    }
}

struct App {
    context: SyncContext,
    http: Arc<ScriptedHttp>,
    navigation: UnboundedReceiver<Navigation>,
}

impl App {
    fn navigations(&mut self) -> Vec<Navigation> {
        let mut events = Vec::new();
        while let Ok(event) = self.navigation.try_recv() {
            events.push(event);
        }
        events
    }
}

fn start(data_dir: &Path) -> App {
    let settings = SyncSettings {
        storage: StorageSettings {
            data_dir: Some(data_dir.to_path_buf()),
        },
        ..SyncSettings::default()
    };
    let http = Arc::new(ScriptedHttp::default());
    let (navigator, navigation) = ChannelNavigator::new();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    let ports = SyncPorts {
        http: http.clone(),
        clock: Arc::new(clock),
        credentials: Arc::new(FileCredentialStore::new(Some(data_dir))),
        windows: Arc::new(FileWindowStore::new(Some(data_dir))),
        navigator: Arc::new(navigator),
    };
    App {
        context: SyncContext::new(settings, ports),
        http,
        navigation,
    }
}

fn quizzes() -> ResourceType {
    ResourceType::new("quizzes").unwrap()
}

fn quiz_page(ids: &[&str], current: u32, total_pages: u32) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "_id": id, "title": format!("Quiz {id}") }))
        .collect();
    json!({
        "data": data,
        "pagination": {
            "currentPage": current,
            "totalPages": total_pages,
            "totalRecords": ids.len(),
        }
    })
}

async fn signed_in(data_dir: &Path) -> App {
    let app = start(data_dir);
    app.http.reply(
        "POST /auth/login",
        200,
        &json!({
            "token": "tok-1",
            "user": { "_id": "t-42", "role": "teacher", "name": "Ada" }
        }),
    );
    app.context
        .sign_in("ada@school.example", "hunter2")
        .await
        .unwrap();
    app
}

#[tokio::test]
async fn test_session_survives_restart() {
    let dir = tempdir().unwrap();
    let first = signed_in(dir.path()).await;
    assert_eq!(first.context.guard().state(), AuthState::SignedIn);
    drop(first);

    let second = start(dir.path());
    assert!(second.context.restore().await);
    second
        .http
        .reply("GET /quizzes", 200, &quiz_page(&["q1"], 1, 1));

    second
        .context
        .list(&CacheKey::list(quizzes()))
        .await
        .unwrap();

    let request = second.http.seen().pop().unwrap();
    assert!(
        request
            .headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "Bearer tok-1")
    );
}

#[tokio::test]
async fn test_expired_session_clears_disk_and_asks_for_sign_in() {
    let dir = tempdir().unwrap();
    let mut app = signed_in(dir.path()).await;
    let key = CacheKey::list(quizzes());
    app.http.reply("GET /quizzes", 200, &quiz_page(&["q1"], 1, 1));
    app.context.list(&key).await.unwrap();
    assert!(app.context.cache().peek(&key).is_some());

    app.http
        .reply("GET /quizzes/detail/q1", 401, &json!({ "message": "jwt expired" }));
    let result = app
        .context
        .detail(&CacheKey::detail(quizzes(), "q1"))
        .await;

    assert_eq!(result, Err(ApplicationError::AuthExpired));
    assert_eq!(app.context.guard().state(), AuthState::Expired);
    assert!(app.context.cache().is_empty());
    assert_eq!(app.navigations(), vec![Navigation::SignIn]);
    assert!(!dir.path().join("credential.json").exists());

    let restarted = start(dir.path());
    assert!(!restarted.context.restore().await);
}

#[tokio::test]
async fn test_deleting_last_item_of_last_page_redirects() {
    let dir = tempdir().unwrap();
    let mut app = signed_in(dir.path()).await;
    let page_three = CacheKey::list(quizzes()).with_page(3);
    app.http
        .reply("GET /quizzes", 200, &quiz_page(&["q21"], 3, 3));
    app.context.list(&page_three).await.unwrap();

    app.http.reply("DELETE /quizzes/q21", 200, &json!({ "success": true }));
    let api = app.context.api();
    app.context
        .mutations()
        .execute(
            Mutation::new([page_three.clone()]).with_patch(Patch::remove("q21")),
            api.delete("/quizzes/q21"),
        )
        .await
        .unwrap();

    // Reading the stale page revalidates it in the background; the server
    // now has only two pages.
    app.http
        .reply("GET /quizzes", 200, &quiz_page(&[], 3, 2));
    let optimistic = app.context.list(&page_three).await.unwrap();
    assert_eq!(
        optimistic,
        ListOutcome::Ready(json!({
            "data": [],
            "pagination": { "currentPage": 3, "totalPages": 3, "totalRecords": 0 }
        }))
    );

    for _ in 0..100 {
        if !app.context.cache().is_fetching(&page_three) {
            break;
        }
        tokio::task::yield_now().await;
    }
    let outcome = app.context.list(&page_three).await.unwrap();

    let corrected = page_three.clone().with_page(2);
    assert_eq!(outcome, ListOutcome::Redirect(corrected.clone()));
    assert_eq!(app.navigations(), vec![Navigation::Redirect(corrected)]);
}

#[tokio::test]
async fn test_rejected_update_rolls_back_cached_detail() {
    let dir = tempdir().unwrap();
    let app = signed_in(dir.path()).await;
    let key = CacheKey::detail(quizzes(), "q7");
    app.http.reply(
        "GET /quizzes/detail/q7",
        200,
        &json!({ "data": { "_id": "q7", "title": "Fractions" } }),
    );
    let before = app.context.detail(&key).await.unwrap();
    assert_eq!(before["title"], "Fractions");

    app.http.reply(
        "PUT /quizzes/q7",
        409,
        &json!({ "message": "Title already exists" }),
    );
    let api = app.context.api();
    let result = app
        .context
        .mutations()
        .execute(
            Mutation::new([key.clone()])
                .with_patch(Patch::merge("q7", json!({ "title": "Decimals" }))),
            api.put("/quizzes/q7", json!({ "title": "Decimals" })),
        )
        .await;

    let Err(ApplicationError::RemoteConflict { fields, .. }) = &result else {
        panic!("expected conflict, got {result:?}");
    };
    assert_eq!(fields.for_field("title"), Some("Title already exists"));
    assert_eq!(app.context.cache().peek(&key), Some(before));
}

#[tokio::test]
async fn test_rate_limit_window_persists_across_restart() {
    let dir = tempdir().unwrap();
    let first = start(dir.path());
    let limiter = first.context.rate_limiter("registration").await;
    for _ in 0..5 {
        limiter.attempt().await.unwrap();
    }
    assert!(limiter.state().is_limited());
    drop(first);

    let second = start(dir.path());
    let limiter = second.context.rate_limiter("registration").await;

    assert!(matches!(
        limiter.state(),
        LimiterState::Limited { remaining_secs: 60 }
    ));
    assert!(matches!(
        limiter.attempt().await,
        Err(ApplicationError::RateLimited { .. })
    ));
}
