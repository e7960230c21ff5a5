//! Environment-sourced settings and their validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::errors::ConfigError;
use crate::pipeline::{BackoffStrategy, JitterStrategy, RetryConfig};

/// World data directory.
pub const WORLD_LOCATION: &str = "WorldLocation";
/// Server start script.
pub const SERVER_SCRIPT: &str = "ServerScript";
/// Renderer executable.
pub const UNMINED_LOCATION: &str = "UnminedLocation";
/// Renderer output directory.
pub const UNMINED_OUTPUT: &str = "UnminedOutput";
/// Blob service endpoint.
pub const STORAGE_ACCOUNT_URI: &str = "StorageAccountUri";
/// Optional SAS query string.
pub const STORAGE_SAS_TOKEN: &str = "StorageSasToken";
/// Container holding the rendered map.
pub const MAP_CONTAINER: &str = "MapContainer";
/// Container holding the mod manifest.
pub const MODLIST_CONTAINER: &str = "ModListContainer";
/// Optional mod-list document.
pub const MODLIST_LOCATION: &str = "ModListLocation";
/// Render subprocess timeout in seconds; `0` disables it.
pub const RENDER_TIMEOUT_SECONDS: &str = "RenderTimeoutSeconds";
/// Attempts per storage call.
pub const STORAGE_MAX_ATTEMPTS: &str = "StorageMaxAttempts";
/// Base retry delay in milliseconds.
pub const STORAGE_RETRY_DELAY_MS: &str = "StorageRetryDelayMs";
/// Retry backoff: `exponential`, `linear` or `constant`.
pub const STORAGE_BACKOFF: &str = "StorageBackoff";
/// Retry jitter: `none`, `full` or `equal`.
pub const STORAGE_JITTER: &str = "StorageJitter";
/// HTTP request timeout in seconds.
pub const STORAGE_REQUEST_TIMEOUT_SECONDS: &str = "StorageRequestTimeoutSeconds";
/// Log output format.
pub const LOG_FORMAT: &str = "LogFormat";

const DEFAULT_MAP_CONTAINER: &str = "map";
const DEFAULT_MODLIST_CONTAINER: &str = "mods";
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Unvalidated configuration exactly as read from the environment.
///
/// Empty and whitespace-only values are normalised to `None` on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    /// `WorldLocation`
    pub world_location: Option<String>,
    /// `ServerScript`
    pub server_script: Option<String>,
    /// `UnminedLocation`
    pub unmined_location: Option<String>,
    /// `UnminedOutput`
    pub unmined_output: Option<String>,
    /// `StorageAccountUri`
    pub storage_account_uri: Option<String>,
    /// `StorageSasToken`
    pub storage_sas_token: Option<String>,
    /// `MapContainer`
    pub map_container: Option<String>,
    /// `ModListContainer`
    pub modlist_container: Option<String>,
    /// `ModListLocation`
    pub modlist_location: Option<String>,
    /// `RenderTimeoutSeconds`
    pub render_timeout_seconds: Option<String>,
    /// `StorageMaxAttempts`
    pub storage_max_attempts: Option<String>,
    /// `StorageRetryDelayMs`
    pub storage_retry_delay_ms: Option<String>,
    /// `StorageBackoff`
    pub storage_backoff: Option<String>,
    /// `StorageJitter`
    pub storage_jitter: Option<String>,
    /// `StorageRequestTimeoutSeconds`
    pub storage_request_timeout_seconds: Option<String>,
    /// `LogFormat`
    pub log_format: Option<String>,
}

impl RawConfig {
    /// Reads every variable from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every variable through `lookup`.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            world_location: get(WORLD_LOCATION),
            server_script: get(SERVER_SCRIPT),
            unmined_location: get(UNMINED_LOCATION),
            unmined_output: get(UNMINED_OUTPUT),
            storage_account_uri: get(STORAGE_ACCOUNT_URI),
            storage_sas_token: get(STORAGE_SAS_TOKEN),
            map_container: get(MAP_CONTAINER),
            modlist_container: get(MODLIST_CONTAINER),
            modlist_location: get(MODLIST_LOCATION),
            render_timeout_seconds: get(RENDER_TIMEOUT_SECONDS),
            storage_max_attempts: get(STORAGE_MAX_ATTEMPTS),
            storage_retry_delay_ms: get(STORAGE_RETRY_DELAY_MS),
            storage_backoff: get(STORAGE_BACKOFF),
            storage_jitter: get(STORAGE_JITTER),
            storage_request_timeout_seconds: get(STORAGE_REQUEST_TIMEOUT_SECONDS),
            log_format: get(LOG_FORMAT),
        }
    }

    /// Names of required variables that are absent or blank, in declaration order.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            (WORLD_LOCATION, &self.world_location),
            (SERVER_SCRIPT, &self.server_script),
            (UNMINED_LOCATION, &self.unmined_location),
            (UNMINED_OUTPUT, &self.unmined_output),
            (STORAGE_ACCOUNT_URI, &self.storage_account_uri),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    /// Validates the raw values into a [`ServerConfig`].
    ///
    /// Every missing required variable is logged before the error is returned.
    pub fn validate(&self) -> Result<ServerConfig, ConfigError> {
        let missing = self.missing_required();
        if !missing.is_empty() {
            for field in &missing {
                error!(
                    field,
                    "Required configuration {field} not found in environment variables"
                );
            }
            return Err(ConfigError::Missing { fields: missing });
        }

        let (
            Some(world),
            Some(script),
            Some(renderer),
            Some(output),
            Some(account_uri),
        ) = (
            &self.world_location,
            &self.server_script,
            &self.unmined_location,
            &self.unmined_output,
            &self.storage_account_uri,
        )
        else {
            return Err(ConfigError::Missing {
                fields: self.missing_required(),
            });
        };

        let map_container = container_name(
            MAP_CONTAINER,
            self.map_container.as_deref(),
            DEFAULT_MAP_CONTAINER,
        )?;
        let modlist_container = container_name(
            MODLIST_CONTAINER,
            self.modlist_container.as_deref(),
            DEFAULT_MODLIST_CONTAINER,
        )?;

        let render_timeout_secs = parse_u64(
            RENDER_TIMEOUT_SECONDS,
            self.render_timeout_seconds.as_deref(),
            DEFAULT_RENDER_TIMEOUT_SECS,
        )?;
        let request_timeout_secs = parse_u64(
            STORAGE_REQUEST_TIMEOUT_SECONDS,
            self.storage_request_timeout_seconds.as_deref(),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                STORAGE_REQUEST_TIMEOUT_SECONDS,
                "0",
                "must be at least one second",
            ));
        }

        let defaults = RetryConfig::default();
        let max_attempts = parse_u64(
            STORAGE_MAX_ATTEMPTS,
            self.storage_max_attempts.as_deref(),
            defaults.max_attempts as u64,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::invalid(STORAGE_MAX_ATTEMPTS, "0", "must be at least 1"));
        }
        let retry_delay_ms = parse_u64(
            STORAGE_RETRY_DELAY_MS,
            self.storage_retry_delay_ms.as_deref(),
            defaults.base_delay_ms,
        )?;
        let backoff = parse_setting(
            STORAGE_BACKOFF,
            self.storage_backoff.as_deref(),
            defaults.backoff_strategy,
        )?;
        let jitter = parse_setting(
            STORAGE_JITTER,
            self.storage_jitter.as_deref(),
            defaults.jitter_strategy,
        )?;
        let render_timeout =
            (render_timeout_secs > 0).then(|| Duration::from_secs(render_timeout_secs));

        Ok(ServerConfig {
            world_path: PathBuf::from(world),
            server_script: PathBuf::from(script),
            renderer_path: PathBuf::from(renderer),
            output_dir: PathBuf::from(output),
            modlist_path: self.modlist_location.as_ref().map(PathBuf::from),
            render_timeout,
            storage: StorageSettings {
                account_uri: account_uri.clone(),
                sas_token: self.storage_sas_token.clone(),
                map_container,
                modlist_container,
                request_timeout: Duration::from_secs(request_timeout_secs),
                retry: defaults
                    .with_max_attempts(usize::try_from(max_attempts).unwrap_or(usize::MAX))
                    .with_base_delay_ms(retry_delay_ms)
                    .with_backoff(backoff)
                    .with_jitter(jitter),
            },
        })
    }
}

/// Where and how the remote store is reached.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct StorageSettings {
    /// Blob service endpoint.
    pub account_uri: String,
    /// SAS query string appended to every request.
    #[serde(skip)]
    pub sas_token: Option<String>,
    /// Container for `map.jpg`.
    pub map_container: String,
    /// Container for `modlist.json`.
    pub modlist_container: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Retry policy for each storage call.
    pub retry: RetryConfig,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("account_uri", &self.account_uri)
            .field("sas_token", &self.sas_token.as_ref().map(|_| "<redacted>"))
            .field("map_container", &self.map_container)
            .field("modlist_container", &self.modlist_container)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    /// World data directory.
    pub world_path: PathBuf,
    /// Server start script.
    pub server_script: PathBuf,
    /// Renderer executable.
    pub renderer_path: PathBuf,
    /// Directory the renderer writes into.
    pub output_dir: PathBuf,
    /// Mod-list document; `None` disables the manifest stage.
    pub modlist_path: Option<PathBuf>,
    /// Render timeout; `None` waits indefinitely.
    pub render_timeout: Option<Duration>,
    /// Remote storage settings.
    pub storage: StorageSettings,
}

impl ServerConfig {
    /// Logs each resolved location.
    pub fn log_resolved(&self) {
        let world = self.world_path.display();
        let script = self.server_script.display();
        let renderer = self.renderer_path.display();
        let output = self.output_dir.display();
        info!(path = %world, "Found world location at {world}");
        info!(path = %script, "Found server start script at {script}");
        info!(path = %renderer, "Found uNmINeD exe at {renderer}");
        info!(path = %output, "uNmINeD output directory is {output}");
        info!(
            uri = %self.storage.account_uri,
            map_container = %self.storage.map_container,
            modlist_container = %self.storage.modlist_container,
            "Using storage account"
        );
        match &self.modlist_path {
            Some(path) => info!(path = %path.display(), "Found mod list at {}", path.display()),
            None => info!("No mod list configured"),
        }
    }

    /// Path of the rendered map image.
    #[must_use]
    pub fn map_path(&self) -> PathBuf {
        map_path(&self.output_dir)
    }
}

/// Path of the rendered map image under `output_dir`.
#[must_use]
pub fn map_path(output_dir: &Path) -> PathBuf {
    output_dir.join(crate::MAP_OBJECT_NAME)
}

fn parse_setting<T>(field: &'static str, raw: Option<&str>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.map_or(Ok(default), |value| {
        value
            .parse::<T>()
            .map_err(|reason| ConfigError::invalid(field, value, reason))
    })
}

fn parse_u64(field: &'static str, raw: Option<&str>, default: u64) -> Result<u64, ConfigError> {
    raw.map_or(Ok(default), |value| {
        value
            .parse::<u64>()
            .map_err(|e| ConfigError::invalid(field, value, e.to_string()))
    })
}

/// Container names: 3-63 characters, lowercase letters, digits and single
/// hyphens, starting and ending with a letter or digit.
fn container_name(
    field: &'static str,
    raw: Option<&str>,
    default: &str,
) -> Result<String, ConfigError> {
    let name = raw.unwrap_or(default);
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !(3..=63).contains(&name.len())
        || !valid_chars
        || name.starts_with('-')
        || name.ends_with('-')
        || name.contains("--")
    {
        return Err(ConfigError::invalid(field, name, "not a valid container name"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> RawConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RawConfig::from_lookup(|key| env.get(key).cloned())
    }

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            (WORLD_LOCATION, "/srv/world"),
            (SERVER_SCRIPT, "/srv/server/start.sh"),
            (UNMINED_LOCATION, "/opt/unmined/unmined-cli"),
            (UNMINED_OUTPUT, "/srv/map"),
            (STORAGE_ACCOUNT_URI, "https://acct.blob.core.windows.net"),
        ]
    }

    #[test]
    fn test_complete_config_validates_with_defaults() {
        let config = lookup(&complete()).validate().unwrap();

        assert_eq!(config.world_path, PathBuf::from("/srv/world"));
        assert_eq!(config.map_path(), PathBuf::from("/srv/map").join("map.jpg"));
        assert_eq!(config.modlist_path, None);
        assert_eq!(config.render_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.storage.map_container, "map");
        assert_eq!(config.storage.modlist_container, "mods");
        assert_eq!(config.storage.retry.max_attempts, 3);
        assert_eq!(config.storage.retry.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.storage.retry.jitter_strategy, JitterStrategy::Full);
    }

    #[test]
    fn test_every_missing_field_is_reported() {
        let err = lookup(&[(SERVER_SCRIPT, "/srv/start.sh")]).validate().unwrap_err();

        assert_eq!(
            err,
            ConfigError::Missing {
                fields: vec![WORLD_LOCATION, UNMINED_LOCATION, UNMINED_OUTPUT, STORAGE_ACCOUNT_URI],
            }
        );
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let mut pairs = complete();
        pairs[0] = (WORLD_LOCATION, "   ");

        let raw = lookup(&pairs);
        assert_eq!(raw.world_location, None);
        assert_eq!(raw.missing_required(), vec![WORLD_LOCATION]);
    }

    #[test]
    fn test_optional_values_are_applied() {
        let mut pairs = complete();
        pairs.extend([
            (MODLIST_LOCATION, "/srv/mods.html"),
            (MAP_CONTAINER, "world-map"),
            (RENDER_TIMEOUT_SECONDS, "0"),
            (STORAGE_MAX_ATTEMPTS, "5"),
            (STORAGE_RETRY_DELAY_MS, "25"),
            (STORAGE_SAS_TOKEN, "sv=2022&sig=abc"),
        ]);

        let config = lookup(&pairs).validate().unwrap();
        assert_eq!(config.modlist_path, Some(PathBuf::from("/srv/mods.html")));
        assert_eq!(config.storage.map_container, "world-map");
        assert_eq!(config.render_timeout, None);
        assert_eq!(config.storage.retry.max_attempts, 5);
        assert_eq!(config.storage.retry.base_delay_ms, 25);
        assert_eq!(config.storage.sas_token.as_deref(), Some("sv=2022&sig=abc"));
    }

    #[test]
    fn test_non_numeric_setting_is_invalid() {
        let mut pairs = complete();
        pairs.push((STORAGE_MAX_ATTEMPTS, "lots"));

        let err = lookup(&pairs).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: STORAGE_MAX_ATTEMPTS, .. }));
    }

    #[test]
    fn test_retry_strategies_are_applied() {
        let mut pairs = complete();
        pairs.extend([(STORAGE_BACKOFF, "linear"), (STORAGE_JITTER, "Equal")]);

        let retry = lookup(&pairs).validate().unwrap().storage.retry;
        assert_eq!(retry.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(retry.jitter_strategy, JitterStrategy::Equal);
    }

    #[test]
    fn test_unknown_retry_strategy_is_invalid() {
        let mut pairs = complete();
        pairs.push((STORAGE_BACKOFF, "fibonacci"));
        let err = lookup(&pairs).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: STORAGE_BACKOFF, .. }));

        let mut pairs = complete();
        pairs.push((STORAGE_JITTER, "lots"));
        let err = lookup(&pairs).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: STORAGE_JITTER, .. }));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut pairs = complete();
        pairs.push((STORAGE_MAX_ATTEMPTS, "0"));

        assert!(lookup(&pairs).validate().is_err());
    }

    #[test]
    fn test_container_name_rules() {
        assert!(container_name(MAP_CONTAINER, Some("map"), "x").is_ok());
        assert!(container_name(MAP_CONTAINER, Some("world-map-2"), "x").is_ok());
        assert!(container_name(MAP_CONTAINER, Some("Map"), "x").is_err());
        assert!(container_name(MAP_CONTAINER, Some("ab"), "x").is_err());
        assert!(container_name(MAP_CONTAINER, Some("-map"), "x").is_err());
        assert!(container_name(MAP_CONTAINER, Some("map--x"), "x").is_err());
    }

    #[test]
    fn test_sas_token_redacted_in_debug() {
        let mut pairs = complete();
        pairs.push((STORAGE_SAS_TOKEN, "sig=secret"));

        let config = lookup(&pairs).validate().unwrap();
        let debug = format!("{:?}", config.storage);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
