//! Layered settings loading.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. An optional TOML/JSON/YAML file
//! 3. `CAMPUS__SECTION__FIELD` environment variables
//!    (e.g. `CAMPUS__API__BASE_URL`)

use std::path::Path;

use campus_domain::{DomainError, SyncSettings};
use config::{Config, Environment, File};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CAMPUS";

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A source could not be read or did not match the settings shape.
    #[error("could not load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// The base URL is not an absolute http(s) URL.
    #[error("invalid base URL {url:?}: {reason}")]
    BaseUrl {
        /// Offending value.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A value is out of range.
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// Loads settings from defaults, the file at `path` (if it exists) and the
/// process environment.
///
/// # Errors
///
/// Returns an error if a source is malformed or a value is invalid.
pub fn load_settings(path: Option<&Path>) -> Result<SyncSettings, SettingsError> {
    load_with_env(path, Environment::with_prefix(ENV_PREFIX))
}

fn load_with_env(path: Option<&Path>, env: Environment) -> Result<SyncSettings, SettingsError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        debug!(path = %path.display(), "reading settings file");
        builder = builder.add_source(File::from(path).required(false));
    }
    let settings: SyncSettings = builder
        .add_source(env.separator("__").try_parsing(true))
        .build()?
        .try_deserialize()?;

    check_base_url(&settings.api.base_url)?;
    settings.validate()?;
    Ok(settings)
}

fn check_base_url(raw: &str) -> Result<(), SettingsError> {
    let invalid = |reason: &str| SettingsError::BaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query or fragment"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = load_with_env(None, no_env()).unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_with_env(Some(&dir.path().join("campus.toml")), no_env()).unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campus.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://school.example/api\"\n\n[cache]\nttl_secs = 30\n",
        )
        .unwrap();

        let settings = load_with_env(Some(&path), no_env()).unwrap();

        assert_eq!(settings.api.base_url, "https://school.example/api");
        assert_eq!(settings.cache.ttl_secs, 30);
        assert_eq!(settings.cache.manual_capacity, 10);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campus.toml");
        std::fs::write(&path, "[rate_limit]\nlimit = 3\n").unwrap();

        let settings = load_with_env(
            Some(&path),
            env(&[
                ("CAMPUS__RATE_LIMIT__LIMIT", "8"),
                ("CAMPUS__API__TIMEOUT_SECS", "4"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.rate_limit.limit, 8);
        assert_eq!(settings.api.timeout_secs, 4);
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let result = load_with_env(None, env(&[("CAMPUS__API__BASE_URL", "ftp://files.example")]));
        assert!(matches!(result, Err(SettingsError::BaseUrl { .. })));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let result = load_with_env(None, env(&[("CAMPUS__CACHE__MANUAL_CAPACITY", "0")]));
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }
}
