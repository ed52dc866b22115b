//! Persisted sign-in credential.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use campus_application::ports::{CredentialStore, StoreError};
use campus_domain::StoredCredential;
use tracing::debug;

use super::store_error;
use crate::serialization::{read_json_file, remove_file_if_exists, write_json_file};

const FILE_NAME: &str = "credential.json";

/// Stores the signed-in credential in `<data dir>/credential.json`.
///
/// On Unix the file is made readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: Option<PathBuf>,
}

impl FileCredentialStore {
    /// Creates a store under `dir`. With no directory, loads find nothing
    /// and saves fail with [`StoreError::Unavailable`].
    #[must_use]
    pub fn new(dir: Option<&Path>) -> Self {
        Self {
            path: dir.map(|d| d.join(FILE_NAME)),
        }
    }

    /// Returns the credential file path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<StoredCredential>, StoreError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        read_json_file(path).await.map_err(store_error)
    }

    async fn save(&self, credential: &StoredCredential) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Err(StoreError::Unavailable);
        };
        write_json_file(path, credential).await.map_err(store_error)?;
        restrict_permissions(path).await?;
        debug!(path = %path.display(), "credential saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        remove_file_if_exists(path).await.map_err(store_error)
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| StoreError::Io(e.to_string()))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
