//! Persisted attempt window for throttled write flows.
//!
//! All methods take the current time as an argument so the window stays a
//! pure value; the application layer supplies time from its clock port.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attempt counter over a fixed time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitWindow {
    /// Attempts that reached the server in the current window.
    pub count: u32,
    /// Start of the current window.
    pub window_start: DateTime<Utc>,
    /// Attempts allowed per window.
    pub limit: u32,
    /// Window length in seconds.
    pub duration_seconds: u64,
    /// Block imposed by a server `retryAfter`, overriding the local estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_blocked_until: Option<DateTime<Utc>>,
}

/// Whether further attempts are currently allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LimiterState {
    /// Attempts are allowed.
    Open {
        /// Attempts left before the limiter engages.
        attempts_left: u32,
    },
    /// Attempts are blocked.
    Limited {
        /// Seconds until the limiter reopens.
        remaining_secs: u64,
    },
}

impl LimiterState {
    /// Returns true when attempts are blocked.
    #[must_use]
    pub const fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

impl RateLimitWindow {
    /// Creates an empty window starting at `now`.
    #[must_use]
    pub const fn new(limit: u32, duration_seconds: u64, now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            limit,
            duration_seconds,
            server_blocked_until: None,
        }
    }

    /// Whole seconds since the window started. Never negative.
    #[must_use]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.window_start).num_seconds()).unwrap_or(0)
    }

    /// Returns true once the window has run past its duration.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_secs(now) > self.duration_seconds
    }

    /// Seconds until attempts are allowed again; zero when open.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        if let Some(until) = self.server_blocked_until {
            let millis = (until - now).num_milliseconds();
            return u64::try_from(millis).map_or(0, |ms| ms.div_ceil(1000));
        }
        if self.count >= self.limit {
            self.duration_seconds
                .saturating_sub(self.elapsed_secs(now))
        } else {
            0
        }
    }

    /// Returns the state at `now` without modifying the window.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> LimiterState {
        let remaining_secs = self.remaining_secs(now);
        if remaining_secs > 0 {
            LimiterState::Limited { remaining_secs }
        } else if self.needs_reset(now) {
            LimiterState::Open {
                attempts_left: self.limit,
            }
        } else {
            LimiterState::Open {
                attempts_left: self.limit.saturating_sub(self.count),
            }
        }
    }

    fn needs_reset(&self, now: DateTime<Utc>) -> bool {
        match self.server_blocked_until {
            Some(until) => now >= until,
            None => {
                self.is_expired(now) || (self.count >= self.limit && self.remaining_secs(now) == 0)
            }
        }
    }

    /// Starts a fresh window when the current one has elapsed or its block
    /// has run out. Returns true if the window was reset.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if self.needs_reset(now) {
            self.reset(now);
            true
        } else {
            false
        }
    }

    /// Clears the counter and starts a new window at `now`.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.count = 0;
        self.window_start = now;
        self.server_blocked_until = None;
    }

    /// Counts one attempt that is about to reach the server.
    ///
    /// The first attempt of an empty window starts it. Returns the state
    /// after counting. Callers check [`Self::state`] first; the counter
    /// saturates at `limit + 1`.
    pub fn record(&mut self, now: DateTime<Utc>) -> LimiterState {
        if self.count == 0 {
            self.window_start = now;
        }
        self.count = self.count.saturating_add(1).min(self.limit.saturating_add(1));
        self.state(now)
    }

    /// Applies a server-provided block that wins over the local estimate.
    pub fn block_until(&mut self, until: DateTime<Utc>) {
        self.server_blocked_until = Some(until);
        self.count = self.count.max(self.limit);
    }

    /// Adopts a new limit or duration, keeping the current count.
    pub fn reconfigure(&mut self, limit: u32, duration_seconds: u64) {
        self.limit = limit;
        self.duration_seconds = duration_seconds;
    }
}
