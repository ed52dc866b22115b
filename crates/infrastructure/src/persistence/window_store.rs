//! Persisted rate-limit windows.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use campus_application::ports::{StoreError, WindowStore};
use campus_domain::RateLimitWindow;
use tokio::sync::Mutex;

use super::store_error;
use crate::serialization::{read_json_file, write_json_file};

const FILE_NAME: &str = "rate_limits.json";

type Windows = BTreeMap<String, RateLimitWindow>;

/// Stores every flow's window in one `<data dir>/rate_limits.json` map.
///
/// Saves are serialized so concurrent flows never lose each other's update.
#[derive(Debug)]
pub struct FileWindowStore {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl FileWindowStore {
    /// Creates a store under `dir`. With no directory, loads find nothing
    /// and saves fail with [`StoreError::Unavailable`].
    #[must_use]
    pub fn new(dir: Option<&Path>) -> Self {
        Self {
            path: dir.map(|d| d.join(FILE_NAME)),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(path: &Path) -> Result<Windows, StoreError> {
        Ok(read_json_file(path)
            .await
            .map_err(store_error)?
            .unwrap_or_default())
    }
}

#[async_trait]
impl WindowStore for FileWindowStore {
    async fn load(&self, flow: &str) -> Result<Option<RateLimitWindow>, StoreError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        Ok(Self::read_all(path).await?.remove(flow))
    }

    async fn save(&self, flow: &str, window: &RateLimitWindow) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Err(StoreError::Unavailable);
        };
        let _guard = self.write_lock.lock().await;
        let mut windows = Self::read_all(path).await?;
        windows.insert(flow.to_string(), window.clone());
        write_json_file(path, &windows).await.map_err(store_error)
    }
}
