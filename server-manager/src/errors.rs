//! Error types for the server manager.
//!
//! Each concern owns its error enum. Stage code turns them into outcome
//! details; only [`ConfigError`] ever stops a run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving configuration.
///
/// Both variants are fatal: no pipeline stage runs after one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// One or more required variables are absent or empty.
    #[error("Missing required configuration: {}", fields.join(", "))]
    Missing {
        /// Names of the missing variables, in declaration order.
        fields: Vec<&'static str>,
    },

    /// A variable is present but holds an unusable value.
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    Invalid {
        /// The variable name.
        field: &'static str,
        /// The raw value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the process runner.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be started at all.
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        /// The executable that failed to start.
        program: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The process started but waiting on it failed.
    #[error("Failed to wait for '{program}': {source}")]
    Wait {
        /// The executable being waited on.
        program: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The process did not exit within its timeout and was killed.
    #[error("'{program}' timed out after {}s", timeout.as_secs())]
    TimedOut {
        /// The executable that timed out.
        program: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The wait was cancelled and the process was killed.
    #[error("'{program}' cancelled: {reason}")]
    Cancelled {
        /// The executable that was cancelled.
        program: String,
        /// The cancellation reason.
        reason: String,
    },
}

impl ProcessError {
    /// Returns true if the process never started.
    #[must_use]
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Errors raised by remote storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage endpoint or object path could not be formed.
    #[error("Invalid storage locator '{locator}': {reason}")]
    InvalidLocator {
        /// The offending locator.
        locator: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request never produced a response.
    #[error("Transport error during {operation}: {message}")]
    Transport {
        /// The operation being attempted.
        operation: &'static str,
        /// Description of the fault.
        message: String,
        /// Whether retrying may succeed.
        transient: bool,
    },

    /// The service answered with an unexpected status code.
    #[error("Storage service returned {status} during {operation}")]
    Status {
        /// The operation being attempted.
        operation: &'static str,
        /// The HTTP status code.
        status: u16,
    },

    /// The upload completed but returned no object handle.
    #[error("Upload of '{object}' returned no object handle")]
    NoHandle {
        /// The object that was uploaded.
        object: String,
    },
}

/// HTTP status codes worth retrying.
const TRANSIENT_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

impl StorageError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(
        operation: &'static str,
        message: impl Into<String>,
        transient: bool,
    ) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
            transient,
        }
    }

    /// Returns true if a retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { transient, .. } => *transient,
            Self::Status { status, .. } => TRANSIENT_STATUS_CODES.contains(status),
            Self::InvalidLocator { .. } | Self::NoHandle { .. } => false,
        }
    }

    /// Returns true if the operation completed without a usable result.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NoHandle { .. })
    }
}

/// Errors raised while reading the mod-list document.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document could not be read or is not valid UTF-8.
    #[error("Failed to read mod list {path}: {source}")]
    Read {
        /// The document path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The element selector could not be compiled.
    #[error("Invalid manifest selector '{selector}': {message}")]
    Selector {
        /// The selector text.
        selector: String,
        /// The parser message.
        message: String,
    },
}

/// Errors raised by a stage outside of its collaborators.
#[derive(Debug, Error)]
pub enum StageError {
    /// The output location could not be prepared.
    #[error("Failed to prepare {path}: {source}")]
    Prepare {
        /// The path being prepared.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The stage's input artifact could not be read.
    #[error("Failed to read artifact {path}: {source}")]
    ReadArtifact {
        /// The artifact path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}
