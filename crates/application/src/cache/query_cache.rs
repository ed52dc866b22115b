//! Keyed cache of server data with stale-while-revalidate reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use campus_domain::{CacheKey, CacheSettings, ResourceType};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{BoundedCache, CacheEntry, Fetcher};
use crate::error::{ApplicationError, ApplicationResult};
use crate::mutation::Patch;
use crate::ports::{CancellationToken, Clock};

type SharedResult = watch::Receiver<Option<ApplicationResult<Value>>>;

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
    result: SharedResult,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    epoch: u64,
}

struct Inner {
    state: Mutex<CacheState>,
    manual: Mutex<BoundedCache<String, Value>>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    generation: AtomicU64,
}

/// Entries captured before an optimistic patch, in key order.
///
/// `None` records that the key was absent. A snapshot belongs to the cache
/// contents it was taken from and is void once the cache is cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    entries: Vec<(CacheKey, Option<CacheEntry>)>,
    epoch: u64,
}

impl CacheSnapshot {
    /// Captured keys.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// The captured entry for `key`. The outer `None` means `key` was not
    /// captured; the inner `None` means it was absent.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Option<&CacheEntry>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, entry)| entry.as_ref())
    }

    /// Number of captured keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache of server values keyed by [`CacheKey`].
///
/// Cheap to clone; clones share state. Owned by the sync context and cleared
/// when the session ends.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Creates an empty cache.
    pub fn new(fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>, settings: &CacheSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::default()),
                manual: Mutex::new(BoundedCache::new(settings.manual_capacity)),
                fetcher,
                clock,
                ttl: settings.ttl(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the value for `key`.
    ///
    /// A cached value is returned immediately even when stale; a stale value
    /// additionally schedules one background refetch. An absent value is
    /// fetched and awaited. Concurrent callers share one fetch.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when nothing is cached. A fetch cancelled
    /// while this call waited falls back to whatever is cached by then.
    pub async fn get(&self, key: &CacheKey) -> ApplicationResult<Value> {
        let mut pending = {
            let now = self.inner.clock.now();
            let mut state = self.inner.state.lock();
            let cached = state
                .entries
                .get(key)
                .map(|entry| (entry.value.clone(), entry.is_stale(now)));
            if let Some((value, stale)) = cached {
                if stale {
                    debug!(key = %key, "stale hit, revalidating");
                    self.start_fetch(&mut state, key);
                } else {
                    debug!(key = %key, "cache hit");
                }
                return Ok(value);
            }
            debug!(key = %key, "cache miss");
            self.start_fetch(&mut state, key)
        };

        let result = match pending.wait_for(Option::is_some).await {
            Ok(shared) => shared.clone().unwrap_or(Err(ApplicationError::Cancelled)),
            Err(_) => Err(ApplicationError::Cancelled),
        };
        match result {
            Err(ApplicationError::Cancelled) => self.peek(key).ok_or(ApplicationError::Cancelled),
            other => other,
        }
    }

    fn start_fetch(&self, state: &mut CacheState, key: &CacheKey) -> SharedResult {
        if let Some(flight) = state.in_flight.get(key) {
            debug!(key = %key, "joining in-flight fetch");
            return flight.result.clone();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (cancel, mut cancelled) = CancellationToken::new();
        let (sender, result) = watch::channel(None);
        state.in_flight.insert(
            key.clone(),
            InFlight {
                generation,
                cancel,
                result: result.clone(),
            },
        );

        let cache = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = cache.inner.fetcher.fetch(&key) => outcome,
                () = cancelled.cancelled() => Err(ApplicationError::Cancelled),
            };
            cache.settle(&key, generation, &outcome);
            sender.send_replace(Some(outcome));
        });
        result
    }

    /// Writes a fetch outcome unless the fetch was cancelled or superseded.
    fn settle(&self, key: &CacheKey, generation: u64, outcome: &ApplicationResult<Value>) {
        let mut state = self.inner.state.lock();
        if !state
            .in_flight
            .get(key)
            .is_some_and(|flight| flight.generation == generation)
        {
            debug!(key = %key, generation, "discarding superseded fetch result");
            return;
        }
        state.in_flight.remove(key);
        match outcome {
            Ok(value) => {
                let entry = CacheEntry::fresh(value.clone(), self.inner.clock.now(), self.inner.ttl);
                state.entries.insert(key.clone(), entry);
            }
            Err(e) if state.entries.contains_key(key) => {
                warn!(key = %key, error = %e, "revalidation failed, keeping cached value");
            }
            Err(_) => {}
        }
    }

    /// Overwrites `key` with a fresh value.
    pub fn put(&self, key: &CacheKey, value: Value) {
        let entry = CacheEntry::fresh(value, self.inner.clock.now(), self.inner.ttl);
        self.inner.state.lock().entries.insert(key.clone(), entry);
    }

    /// Marks `key` stale so the next read refetches.
    pub fn invalidate(&self, key: &CacheKey) {
        self.invalidate_many(std::slice::from_ref(key));
    }

    /// Marks every key in `keys` stale.
    pub fn invalidate_many(&self, keys: &[CacheKey]) {
        let mut state = self.inner.state.lock();
        for key in keys {
            if let Some(entry) = state.entries.get_mut(key) {
                entry.invalidated = true;
            }
        }
    }

    /// Marks every key of `resource` stale.
    pub fn invalidate_resource(&self, resource: &ResourceType) {
        let mut state = self.inner.state.lock();
        let mut count = 0_usize;
        for entry in state
            .entries
            .iter_mut()
            .filter(|(key, _)| key.resource() == resource)
            .map(|(_, entry)| entry)
        {
            entry.invalidated = true;
            count += 1;
        }
        debug!(resource = %resource, count, "invalidated resource");
    }

    /// Cancels the in-flight fetch for `key`. A response that still arrives
    /// is discarded.
    pub fn cancel_in_flight(&self, key: &CacheKey) {
        if let Some(flight) = self.inner.state.lock().in_flight.remove(key) {
            debug!(key = %key, "cancelled in-flight fetch");
            flight.cancel.cancel();
        }
    }

    /// Returns true while a fetch for `key` is in flight.
    #[must_use]
    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.inner.state.lock().in_flight.contains_key(key)
    }

    /// Returns the cached value without fetching.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<Value> {
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Returns the cached entry without fetching.
    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.state.lock().entries.get(key).cloned()
    }

    /// Puts back exactly `entry`, or removes `key` when `entry` is `None`.
    pub fn restore(&self, key: &CacheKey, entry: Option<CacheEntry>) {
        let mut state = self.inner.state.lock();
        match entry {
            Some(entry) => state.entries.insert(key.clone(), entry),
            None => state.entries.remove(key),
        };
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry, detaches every in-flight fetch and empties the
    /// manual namespace.
    ///
    /// Detached fetches still run to completion and their waiters receive
    /// the outcome, but nothing is written back.
    pub fn clear(&self) {
        let detached = {
            let mut state = self.inner.state.lock();
            state.entries.clear();
            state.epoch += 1;
            let detached = state.in_flight.len();
            state.in_flight.clear();
            detached
        };
        self.inner.manual.lock().clear();
        debug!(detached, "query cache cleared");
    }

    /// A hook that clears this cache while it is still alive. Holds no
    /// strong reference, so it can be registered with objects the cache
    /// itself keeps alive.
    pub fn clear_hook(&self) -> impl Fn() + Send + Sync + 'static {
        let inner = Arc::downgrade(&self.inner);
        move || {
            if let Some(inner) = inner.upgrade() {
                Self { inner }.clear();
            }
        }
    }

    /// Stores a value in the bounded manual namespace.
    pub fn put_manual(&self, key: impl Into<String>, value: Value) {
        if let Some((evicted, _)) = self.inner.manual.lock().insert(key.into(), value) {
            debug!(key = %evicted, "evicted oldest manual entry");
        }
    }

    /// Reads from the bounded manual namespace.
    #[must_use]
    pub fn get_manual(&self, key: &str) -> Option<Value> {
        self.inner.manual.lock().get(&key.to_string()).cloned()
    }

    /// Removes from the bounded manual namespace.
    pub fn remove_manual(&self, key: &str) -> Option<Value> {
        self.inner.manual.lock().remove(&key.to_string())
    }

    /// Cancels in-flight fetches for `keys`, captures their entries and
    /// applies `patch`, all under one lock. `Patch::Custom` closures run
    /// with that lock held.
    ///
    /// Patched entries are stamped fresh so no revalidation races the write.
    pub(crate) fn apply_optimistic(&self, keys: &[CacheKey], patch: &Patch) -> CacheSnapshot {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        let mut snapshot = CacheSnapshot {
            entries: Vec::new(),
            epoch: state.epoch,
        };
        for key in keys {
            if snapshot.get(key).is_some() {
                continue;
            }
            if let Some(flight) = state.in_flight.remove(key) {
                flight.cancel.cancel();
            }
            let previous = state.entries.get(key).cloned();
            if let Some(entry) = &previous {
                match patch.apply(key, &entry.value) {
                    Some(value) => {
                        state
                            .entries
                            .insert(key.clone(), CacheEntry::fresh(value, now, self.inner.ttl));
                    }
                    None => {
                        state.entries.remove(key);
                    }
                }
            }
            snapshot.entries.push((key.clone(), previous));
        }
        snapshot
    }

    /// Returns true if the cache has not been cleared since `snapshot` was
    /// taken.
    pub(crate) fn holds(&self, snapshot: &CacheSnapshot) -> bool {
        self.inner.state.lock().epoch == snapshot.epoch
    }

    /// Restores every key in `snapshot` to exactly its captured entry.
    ///
    /// Returns false and writes nothing when the cache was cleared after the
    /// snapshot was taken.
    pub(crate) fn restore_snapshot(&self, snapshot: CacheSnapshot) -> bool {
        let mut state = self.inner.state.lock();
        if state.epoch != snapshot.epoch {
            debug!(keys = snapshot.entries.len(), "cache cleared since snapshot, not restoring");
            return false;
        }
        for (key, entry) in snapshot.entries {
            match entry {
                Some(entry) => state.entries.insert(key, entry),
                None => state.entries.remove(&key),
            };
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use crate::test_support::{GatedFetcher, resource, t0};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn cache_with(fetcher: Arc<GatedFetcher>) -> (QueryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let cache = QueryCache::new(fetcher, clock.clone(), &CacheSettings::default());
        (cache, clock)
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::list(resource(name))
    }

    async fn wait_idle(cache: &QueryCache, key: &CacheKey) {
        for _ in 0..100 {
            if !cache.is_fetching(key) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("fetch for {key} never settled");
    }

    async fn wait_fetching(cache: &QueryCache, key: &CacheKey) {
        for _ in 0..100 {
            if cache.is_fetching(key) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("fetch for {key} never started");
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let fetcher = GatedFetcher::new(json!({"data": [1, 2, 3]}));
        let (cache, _) = cache_with(fetcher.clone());
        let k = key("quizzes");
        fetcher.hold();

        let release = async {
            tokio::task::yield_now().await;
            fetcher.release();
        };
        let (a, b, ()) = tokio::join!(cache.get(&k), cache.get(&k), release);

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(a.unwrap(), json!({"data": [1, 2, 3]}));
        assert_eq!(b.unwrap(), json!({"data": [1, 2, 3]}));
        assert_eq!(cache.peek(&k), Some(json!({"data": [1, 2, 3]})));
    }

    #[tokio::test]
    async fn test_fresh_hit_does_not_fetch() {
        let fetcher = GatedFetcher::new(json!("server"));
        let (cache, _) = cache_with(fetcher.clone());
        let k = key("badges");
        cache.put(&k, json!("cached"));

        assert_eq!(cache.get(&k).await.unwrap(), json!("cached"));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_value_served_while_revalidating_once() {
        let fetcher = GatedFetcher::new(json!("fresh"));
        let (cache, clock) = cache_with(fetcher.clone());
        let k = key("leaderboard");
        cache.put(&k, json!("old"));
        clock.advance_secs(301);
        fetcher.hold();

        assert_eq!(cache.get(&k).await.unwrap(), json!("old"));
        assert_eq!(cache.get(&k).await.unwrap(), json!("old"));
        assert_eq!(fetcher.calls(), 1);

        fetcher.release();
        wait_idle(&cache, &k).await;
        assert_eq!(cache.peek(&k), Some(json!("fresh")));
        assert!(!cache.entry(&k).unwrap().is_stale(clock.now()));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let fetcher = GatedFetcher::new(json!("refetched"));
        let (cache, _) = cache_with(fetcher.clone());
        let k = key("assignments");
        cache.put(&k, json!("before"));
        cache.invalidate(&k);

        assert_eq!(cache.get(&k).await.unwrap(), json!("before"));
        wait_idle(&cache, &k).await;
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.peek(&k), Some(json!("refetched")));
    }

    #[tokio::test]
    async fn test_invalidate_resource_only_touches_that_resource() {
        let fetcher = GatedFetcher::new(json!(null));
        let (cache, clock) = cache_with(fetcher);
        let quizzes_p1 = key("quizzes");
        let quizzes_p2 = key("quizzes").with_page(2);
        let badges = key("badges");
        for k in [&quizzes_p1, &quizzes_p2, &badges] {
            cache.put(k, json!([]));
        }

        cache.invalidate_resource(&resource("quizzes"));

        let now = clock.now();
        assert!(cache.entry(&quizzes_p1).unwrap().is_stale(now));
        assert!(cache.entry(&quizzes_p2).unwrap().is_stale(now));
        assert!(!cache.entry(&badges).unwrap().is_stale(now));
    }

    #[tokio::test]
    async fn test_failed_fetch_caches_nothing() {
        let fetcher = GatedFetcher::new(json!("ok"));
        let (cache, _) = cache_with(fetcher.clone());
        let k = key("classes");
        fetcher.queue(
            &k,
            Err(ApplicationError::ServerError {
                status: 500,
                message: "boom".to_string(),
            }),
        );

        assert!(matches!(
            cache.get(&k).await,
            Err(ApplicationError::ServerError { status: 500, .. })
        ));
        assert!(cache.peek(&k).is_none());

        assert_eq!(cache.get(&k).await.unwrap(), json!("ok"));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_never_overwrites_later_write() {
        let fetcher = GatedFetcher::new(json!("server"));
        let (cache, _) = cache_with(fetcher.clone());
        let k = key("quizzes");
        cache.put(&k, json!("initial"));
        cache.invalidate(&k);
        fetcher.hold();

        assert_eq!(cache.get(&k).await.unwrap(), json!("initial"));
        assert!(cache.is_fetching(&k));

        cache.cancel_in_flight(&k);
        cache.put(&k, json!("optimistic"));
        fetcher.release();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.peek(&k), Some(json!("optimistic")));
    }

    #[tokio::test]
    async fn test_waiter_on_cancelled_fetch_gets_cached_value() {
        let fetcher = GatedFetcher::new(json!("server"));
        let (cache, _) = cache_with(fetcher.clone());
        let k = key("students");
        fetcher.hold();

        let waiter = tokio::spawn({
            let cache = cache.clone();
            let k = k.clone();
            async move { cache.get(&k).await }
        });
        wait_fetching(&cache, &k).await;

        cache.put(&k, json!("local"));
        cache.cancel_in_flight(&k);

        assert_eq!(waiter.await.unwrap().unwrap(), json!("local"));
    }

    #[tokio::test]
    async fn test_optimistic_snapshot_restores_absent_and_present() {
        let fetcher = GatedFetcher::new(json!(null));
        let (cache, clock) = cache_with(fetcher);
        let present = key("quizzes");
        let absent = key("quizzes").with_page(2);
        cache.put(&present, json!([{"id": "1"}, {"id": "2"}]));
        clock.advance_secs(400);
        let before = cache.entry(&present);

        let snapshot = cache.apply_optimistic(
            &[present.clone(), absent.clone(), present.clone()],
            &Patch::remove("1"),
        );
        assert_eq!(snapshot.len(), 2);
        assert_eq!(cache.peek(&present), Some(json!([{"id": "2"}])));
        assert!(cache.peek(&absent).is_none());

        cache.restore_snapshot(snapshot);

        assert_eq!(cache.entry(&present), before);
        assert!(cache.entry(&absent).is_none());
    }

    #[tokio::test]
    async fn test_manual_namespace_is_fifo_bounded() {
        let fetcher = GatedFetcher::new(json!(null));
        let (cache, _) = cache_with(fetcher);
        for i in 1..=11 {
            cache.put_manual(format!("k{i}"), json!(i));
        }

        assert!(cache.get_manual("k1").is_none());
        assert_eq!(cache.get_manual("k11"), Some(json!(11)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let fetcher = GatedFetcher::new(json!(null));
        let (cache, _) = cache_with(fetcher);
        cache.put(&key("quizzes"), json!([]));
        cache.put_manual("draft", json!({}));

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.get_manual("draft").is_none());
    }

    #[tokio::test]
    async fn test_clear_detaches_in_flight_fetch() {
        let fetcher = GatedFetcher::new(json!("server"));
        let (cache, _) = cache_with(fetcher.clone());
        let k = key("grades");
        fetcher.queue(&k, Err(ApplicationError::AuthExpired));
        fetcher.hold();

        let waiter = tokio::spawn({
            let cache = cache.clone();
            let k = k.clone();
            async move { cache.get(&k).await }
        });
        wait_fetching(&cache, &k).await;

        cache.clear();
        assert!(!cache.is_fetching(&k));
        fetcher.release();

        assert_eq!(waiter.await.unwrap(), Err(ApplicationError::AuthExpired));
        assert!(cache.peek(&k).is_none());
    }

    #[tokio::test]
    async fn test_clear_hook_does_not_keep_cache_alive() {
        let fetcher = GatedFetcher::new(json!(null));
        let (cache, _) = cache_with(fetcher);
        cache.put(&key("quizzes"), json!([]));
        let hook = cache.clear_hook();

        hook();
        assert!(cache.is_empty());

        drop(cache);
        hook();
    }
}
