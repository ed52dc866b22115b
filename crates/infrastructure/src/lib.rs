//! Campus Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, plus settings loading.

pub mod adapters;
pub mod persistence;
pub mod serialization;
pub mod settings;
pub mod wiring;

pub use adapters::{ChannelNavigator, ReqwestHttpClient, SystemClock};
pub use persistence::{FileCredentialStore, FileWindowStore, data_dir};
pub use serialization::{
    SerializationError, from_json_bytes, read_json_file, remove_file_if_exists,
    to_json_stable_bytes, write_json_file,
};
pub use settings::{ENV_PREFIX, SettingsError, load_settings};
pub use wiring::sync_ports;
