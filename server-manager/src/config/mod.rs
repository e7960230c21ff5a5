//! Configuration loading and validation.
//!
//! Configuration is read once from the environment into a [`RawConfig`] and
//! validated into a [`ServerConfig`]. Pipeline stages only accept the
//! validated form.

mod settings;

pub use settings::{
    map_path, RawConfig, ServerConfig, StorageSettings, LOG_FORMAT, MAP_CONTAINER,
    MODLIST_CONTAINER, MODLIST_LOCATION, RENDER_TIMEOUT_SECONDS, SERVER_SCRIPT,
    STORAGE_ACCOUNT_URI, STORAGE_BACKOFF, STORAGE_JITTER, STORAGE_MAX_ATTEMPTS,
    STORAGE_REQUEST_TIMEOUT_SECONDS,
    STORAGE_RETRY_DELAY_MS, STORAGE_SAS_TOKEN, UNMINED_LOCATION, UNMINED_OUTPUT,
    WORLD_LOCATION,
};
