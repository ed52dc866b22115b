//! File-backed implementations of the persistence ports.
//!
//! Files live in the configured data directory, or the platform data
//! directory when none is configured:
//! - Linux: ~/.local/share/campus/
//! - macOS: ~/Library/Application Support/campus/
//! - Windows: %APPDATA%/campus/

mod credential_store;
mod window_store;

use std::path::PathBuf;

use campus_application::ports::StoreError;
use campus_domain::StorageSettings;

use crate::serialization::SerializationError;

pub use credential_store::FileCredentialStore;
pub use window_store::FileWindowStore;

/// Resolves the data directory for `settings`.
#[must_use]
pub fn data_dir(settings: &StorageSettings) -> Option<PathBuf> {
    settings
        .data_dir
        .clone()
        .or_else(|| dirs::data_dir().map(|p| p.join("campus")))
}

fn store_error(error: SerializationError) -> StoreError {
    match error {
        SerializationError::Io(e) => StoreError::Io(e.to_string()),
        SerializationError::Serialize(e) | SerializationError::Deserialize(e) => {
            StoreError::Serialization(e.to_string())
        }
    }
}
