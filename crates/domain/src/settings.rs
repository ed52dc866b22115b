//! Sync core settings.
//!
//! Every field has a default so a partial configuration file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DomainError, DomainResult};

/// REST backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Timeout for ordinary calls, in seconds.
    pub timeout_secs: u64,
    /// Timeout for file downloads, in seconds.
    pub download_timeout_secs: u64,
    /// Public sign-in endpoint.
    pub login_path: String,
    /// Protected endpoint returning the signed-in user.
    pub profile_path: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_secs: 10,
            download_timeout_secs: 60,
            login_path: "/auth/login".to_string(),
            profile_path: "/users/profile".to_string(),
        }
    }
}

impl ApiSettings {
    /// Timeout for ordinary calls.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Timeout for file downloads.
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Query cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds after which a cached entry is stale.
    pub ttl_secs: u64,
    /// Capacity of the bounded manual cache.
    pub manual_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            manual_capacity: 10,
        }
    }
}

impl CacheSettings {
    /// Time-to-live of cached entries.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Attempt throttle settings for sensitive write flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Attempts allowed per window.
    pub limit: u32,
    /// Window length in seconds.
    pub duration_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 5,
            duration_secs: 60,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for persisted credentials and rate-limit windows. The
    /// platform data directory is used when unset.
    pub data_dir: Option<PathBuf>,
}

/// All settings of the sync core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncSettings {
    /// REST backend.
    pub api: ApiSettings,
    /// Query cache.
    pub cache: CacheSettings,
    /// Attempt throttle.
    pub rate_limit: RateLimitSettings,
    /// Local persistence.
    pub storage: StorageSettings,
}

impl SyncSettings {
    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidSetting` naming the first bad value.
    pub fn validate(&self) -> DomainResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(DomainError::InvalidSetting("api.base_url is empty".to_string()));
        }
        for path in [&self.api.login_path, &self.api.profile_path] {
            if !path.starts_with('/') {
                return Err(DomainError::InvalidSetting(format!(
                    "endpoint path {path:?} must start with '/'"
                )));
            }
        }
        if self.api.timeout_secs == 0 || self.api.download_timeout_secs == 0 {
            return Err(DomainError::InvalidSetting(
                "api timeouts must be at least one second".to_string(),
            ));
        }
        if self.cache.manual_capacity == 0 {
            return Err(DomainError::InvalidSetting(
                "cache.manual_capacity must be positive".to_string(),
            ));
        }
        if self.rate_limit.limit == 0 || self.rate_limit.duration_secs == 0 {
            return Err(DomainError::InvalidSetting(
                "rate_limit.limit and rate_limit.duration_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
