//! Navigator that forwards requests to the UI over a channel.

use campus_application::ports::{Navigation, Navigator};
use tokio::sync::mpsc;
use tracing::warn;

/// Sends every navigation to a receiver owned by the UI loop.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    sender: mpsc::UnboundedSender<Navigation>,
}

impl ChannelNavigator {
    /// Creates a navigator and the receiver the UI should drain.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Navigation>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, navigation: Navigation) {
        if let Err(e) = self.sender.send(navigation) {
            warn!(navigation = ?e.0, "navigation dropped, no receiver");
        }
    }
}
