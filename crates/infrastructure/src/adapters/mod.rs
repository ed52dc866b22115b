//! Adapters implementing the application ports.

mod channel_navigator;
mod reqwest_client;
mod system_clock;

pub use channel_navigator::ChannelNavigator;
pub use reqwest_client::ReqwestHttpClient;
pub use system_clock::SystemClock;
