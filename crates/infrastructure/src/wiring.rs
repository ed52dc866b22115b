//! Production adapters for the sync core.

use std::sync::Arc;

use campus_application::ports::{HttpClientError, Navigation};
use campus_application::SyncPorts;
use campus_domain::SyncSettings;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::adapters::{ChannelNavigator, ReqwestHttpClient, SystemClock};
use crate::persistence::{FileCredentialStore, FileWindowStore, data_dir};

/// Builds the real adapters for `settings`. Navigation requests arrive on
/// the returned receiver.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built for the base URL.
pub fn sync_ports(
    settings: &SyncSettings,
) -> Result<(SyncPorts, mpsc::UnboundedReceiver<Navigation>), HttpClientError> {
    let http = ReqwestHttpClient::new(&settings.api.base_url)?;
    let dir = data_dir(&settings.storage);
    match &dir {
        Some(dir) => info!(data_dir = %dir.display(), "using data directory"),
        None => warn!("no data directory, session and limits will not persist"),
    }
    let (navigator, navigation) = ChannelNavigator::new();

    let ports = SyncPorts {
        http: Arc::new(http),
        clock: Arc::new(SystemClock::new()),
        credentials: Arc::new(FileCredentialStore::new(dir.as_deref())),
        windows: Arc::new(FileWindowStore::new(dir.as_deref())),
        navigator: Arc::new(navigator),
    };
    Ok((ports, navigation))
}
