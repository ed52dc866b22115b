//! Client-side attempt throttle for sensitive write flows.
//!
//! Each flow (registration, password reset, ...) has its own persisted
//! [`RateLimitWindow`]. Attempts are counted only when they are about to
//! reach the server; rejected attempts and client validation failures never
//! count.

use std::sync::Arc;
use std::time::Duration;

use campus_domain::{LimiterState, RateLimitSettings, RateLimitWindow};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::{Clock, WindowStore};

/// Upper bound for a server-imposed block.
const MAX_BLOCK_SECS: u64 = 24 * 60 * 60;

/// Throttles one flow and persists its window across restarts.
pub struct RateLimiter {
    flow: String,
    window: Mutex<RateLimitWindow>,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<LimiterState>,
}

impl RateLimiter {
    /// Loads the persisted window of `flow`, or starts an empty one.
    ///
    /// The configured limit and duration replace the persisted ones.
    pub async fn load(
        flow: impl Into<String>,
        settings: &RateLimitSettings,
        store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let flow = flow.into();
        let now = clock.now();
        let mut window = match store.load(&flow).await {
            Ok(Some(window)) => window,
            Ok(None) => RateLimitWindow::new(settings.limit, settings.duration_secs, now),
            Err(e) => {
                warn!(flow = %flow, error = %e, "could not load rate-limit window, starting fresh");
                RateLimitWindow::new(settings.limit, settings.duration_secs, now)
            }
        };
        window.reconfigure(settings.limit, settings.duration_secs);
        window.refresh(now);
        let (state, _) = watch::channel(window.state(now));
        Self {
            flow,
            window: Mutex::new(window),
            store,
            clock,
            state,
        }
    }

    /// Flow name.
    #[must_use]
    pub fn flow(&self) -> &str {
        &self.flow
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LimiterState {
        self.window.lock().state(self.clock.now())
    }

    /// A copy of the current window.
    #[must_use]
    pub fn window(&self) -> RateLimitWindow {
        self.window.lock().clone()
    }

    /// Subscribes to state changes. Updated on every attempt and countdown
    /// tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LimiterState> {
        self.state.subscribe()
    }

    /// Counts one attempt that is about to reach the server.
    ///
    /// Returns the state after counting; the attempt that reaches the limit
    /// is still allowed and leaves the limiter engaged.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` without counting while the limiter is engaged.
    pub async fn attempt(&self) -> ApplicationResult<LimiterState> {
        let now = self.clock.now();
        let (outcome, changed) = {
            let mut window = self.window.lock();
            let refreshed = window.refresh(now);
            match window.state(now) {
                LimiterState::Limited { remaining_secs } => (
                    Err(ApplicationError::RateLimited {
                        retry_after_secs: Some(remaining_secs),
                    }),
                    refreshed.then(|| window.clone()),
                ),
                LimiterState::Open { .. } => {
                    let state = window.record(now);
                    (Ok(state), Some(window.clone()))
                }
            }
        };

        match &outcome {
            Ok(state) => {
                debug!(flow = %self.flow, state = ?state, "attempt counted");
                self.state.send_replace(*state);
            }
            Err(e) => debug!(flow = %self.flow, error = %e, "attempt rejected"),
        }
        if let Some(window) = changed {
            self.persist(&window).await;
        }
        outcome
    }

    /// Applies a server `retryAfter`, which wins over the local estimate.
    pub async fn apply_retry_after(&self, secs: u64) {
        let now = self.clock.now();
        let clamped = i64::try_from(secs.min(MAX_BLOCK_SECS)).unwrap_or(0);
        let until = now + chrono::Duration::seconds(clamped);
        let window = {
            let mut window = self.window.lock();
            window.block_until(until);
            window.clone()
        };
        warn!(flow = %self.flow, retry_after_secs = secs, "server throttled the flow");
        self.state.send_replace(window.state(now));
        self.persist(&window).await;
    }

    /// Clears the counter, e.g. after a successful submission.
    pub async fn reset(&self) {
        let now = self.clock.now();
        let window = {
            let mut window = self.window.lock();
            window.reset(now);
            window.clone()
        };
        info!(flow = %self.flow, "rate limit reset");
        self.state.send_replace(window.state(now));
        self.persist(&window).await;
    }

    /// Publishes the state once per second until the limiter reopens.
    ///
    /// Returns immediately (after one publication) when not limited.
    pub async fn run_countdown(&self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let now = self.clock.now();
            let (state, reset) = {
                let mut window = self.window.lock();
                let reset = window.refresh(now);
                (window.state(now), reset.then(|| window.clone()))
            };
            self.state.send_replace(state);
            if let Some(window) = reset {
                self.persist(&window).await;
            }
            match state {
                LimiterState::Limited { remaining_secs } => {
                    debug!(flow = %self.flow, remaining_secs, "countdown tick");
                }
                LimiterState::Open { .. } => {
                    debug!(flow = %self.flow, "countdown finished");
                    break;
                }
            }
        }
    }

    async fn persist(&self, window: &RateLimitWindow) {
        if let Err(e) = self.store.save(&self.flow, window).await {
            warn!(flow = %self.flow, error = %e, "could not persist rate-limit window");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use crate::test_support::{MemoryWindows, t0};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    async fn limiter(store: Arc<MemoryWindows>) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let limiter = RateLimiter::load(
            "registration",
            &RateLimitSettings::default(),
            store,
            clock.clone(),
        )
        .await;
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_sixth_attempt_rejected_until_window_passes() {
        let (limiter, clock) = limiter(Arc::new(MemoryWindows::default())).await;

        for _ in 0..4 {
            assert!(!limiter.attempt().await.unwrap().is_limited());
        }
        assert_eq!(
            limiter.attempt().await.unwrap(),
            LimiterState::Limited { remaining_secs: 60 }
        );

        clock.advance_secs(10);
        let rejected = limiter.attempt().await;
        assert_eq!(
            rejected,
            Err(ApplicationError::RateLimited {
                retry_after_secs: Some(50)
            })
        );
        assert_eq!(limiter.window().count, 5);

        clock.advance_secs(50);
        assert_eq!(
            limiter.attempt().await.unwrap(),
            LimiterState::Open { attempts_left: 4 }
        );
        assert_eq!(limiter.window().count, 1);
    }

    #[tokio::test]
    async fn test_burst_late_in_idle_window_gets_full_window() {
        let (limiter, clock) = limiter(Arc::new(MemoryWindows::default())).await;

        clock.advance_secs(59);
        for _ in 0..4 {
            limiter.attempt().await.unwrap();
        }
        assert_eq!(
            limiter.attempt().await.unwrap(),
            LimiterState::Limited { remaining_secs: 60 }
        );

        clock.advance_secs(1);
        assert_eq!(
            limiter.attempt().await,
            Err(ApplicationError::RateLimited {
                retry_after_secs: Some(59)
            })
        );
        assert_eq!(limiter.window().count, 5);
    }

    #[tokio::test]
    async fn test_window_persists_across_restarts() {
        let store = Arc::new(MemoryWindows::default());
        let (first, _) = limiter(store.clone()).await;
        for _ in 0..5 {
            first.attempt().await.unwrap();
        }
        assert_eq!(store.saves.load(Ordering::SeqCst), 5);

        let (restarted, _) = limiter(store).await;
        assert!(restarted.state().is_limited());
        assert!(restarted.attempt().await.is_err());
    }

    #[tokio::test]
    async fn test_server_retry_after_wins() {
        let (limiter, clock) = limiter(Arc::new(MemoryWindows::default())).await;
        limiter.attempt().await.unwrap();

        limiter.apply_retry_after(120).await;
        assert_eq!(limiter.state(), LimiterState::Limited { remaining_secs: 120 });

        // Past the local window but inside the server block.
        clock.advance_secs(90);
        assert_eq!(limiter.state(), LimiterState::Limited { remaining_secs: 30 });

        clock.advance_secs(30);
        assert_eq!(
            limiter.attempt().await.unwrap(),
            LimiterState::Open { attempts_left: 4 }
        );
    }

    #[tokio::test]
    async fn test_reset_reopens() {
        let (limiter, _) = limiter(Arc::new(MemoryWindows::default())).await;
        for _ in 0..5 {
            limiter.attempt().await.unwrap();
        }
        limiter.reset().await;
        assert_eq!(limiter.state(), LimiterState::Open { attempts_left: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_publishes_until_open() {
        let (limiter, clock) = limiter(Arc::new(MemoryWindows::default())).await;
        let limiter = Arc::new(limiter);
        for _ in 0..5 {
            limiter.attempt().await.unwrap();
        }
        let mut states = limiter.subscribe();

        let countdown = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move { limiter.run_countdown().await }
        });
        states.changed().await.unwrap();
        assert!(states.borrow_and_update().is_limited());

        clock.advance_secs(61);
        countdown.await.unwrap();
        assert_eq!(*states.borrow(), LimiterState::Open { attempts_left: 5 });
        assert_eq!(limiter.window().count, 0);
    }
}
