//! Campus - command-line front end for the sync core
//!
//! Loads settings, restores the persisted session and runs one command
//! against the REST backend. Navigation requests from the core are logged.
//!
//! ```text
//! campus login <email>              (password from CAMPUS_PASSWORD)
//! campus list <resource> [page] [search]
//! campus show <resource> <id>
//! campus logout
//! ```

use std::path::PathBuf;

use campus_application::{ListOutcome, Navigation, SyncContext};
use campus_domain::{CacheKey, ResourceType};
use campus_infrastructure::{load_settings, sync_ports};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: campus <login EMAIL | list RESOURCE [PAGE] [SEARCH] | show RESOURCE ID | logout>";

enum Command {
    Login { email: String },
    List { key: CacheKey },
    Show { key: CacheKey },
    Logout,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["login", email] => Ok(Self::Login {
                email: (*email).to_string(),
            }),
            ["list", resource, rest @ ..] if rest.len() <= 2 => {
                let mut key = CacheKey::list(resource_type(resource)?);
                if let Some(page) = rest.first() {
                    let page = page
                        .parse()
                        .map_err(|_| format!("page must be a number, got {page:?}"))?;
                    key = key.with_page(page);
                }
                if let Some(term) = rest.get(1) {
                    key = key.with_search(*term);
                }
                Ok(Self::List { key })
            }
            ["show", resource, id] => Ok(Self::Show {
                key: CacheKey::detail(resource_type(resource)?, *id),
            }),
            ["logout"] => Ok(Self::Logout),
            _ => Err(USAGE.to_string()),
        }
    }
}

fn resource_type(name: &str) -> Result<ResourceType, String> {
    ResourceType::new(name).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config_path = std::env::var_os("CAMPUS_CONFIG")
        .map_or_else(|| PathBuf::from("campus.toml"), PathBuf::from);
    let settings = load_settings(Some(&config_path))?;
    info!(base_url = %settings.api.base_url, "starting Campus v{}", env!("CARGO_PKG_VERSION"));

    let (ports, mut navigation) = sync_ports(&settings)?;
    let context = SyncContext::new(settings, ports);
    let restored = context.restore().await;
    info!(restored, "session checked");

    let result = run(&context, command).await;
    drain_navigation(&mut navigation);
    result
}

async fn run(context: &SyncContext, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Login { email } => {
            let password = std::env::var("CAMPUS_PASSWORD").unwrap_or_default();
            let session = context.sign_in(&email, &password).await?;
            info!(
                subject = ?session.subject.map(|s| s.to_string()),
                role = ?session.role,
                "signed in"
            );
        }
        Command::List { key } => {
            let value = match context.list(&key).await? {
                ListOutcome::Ready(value) => value,
                ListOutcome::Redirect(corrected) => {
                    info!(page = corrected.page(), "following redirect");
                    context.cache().get(&corrected).await?
                }
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Show { key } => {
            let value = context.detail(&key).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Logout => {
            context.sign_out().await?;
            info!("signed out");
        }
    }
    Ok(())
}

fn drain_navigation(navigation: &mut UnboundedReceiver<Navigation>) {
    while let Ok(event) = navigation.try_recv() {
        match event {
            Navigation::SignIn => warn!("session ended, run `campus login <email>`"),
            Navigation::Redirect(key) => info!(target_key = %key, "redirected"),
        }
    }
}
