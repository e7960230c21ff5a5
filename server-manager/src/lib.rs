//! # Server Manager
//!
//! Prepares and launches a game server:
//!
//! - **Render**: regenerates `map.jpg` from the world data with an external renderer
//! - **Publish**: replaces the map image and the mod manifest in blob storage
//! - **Launch**: starts the server through its start script and supervises it
//!
//! Only missing or invalid configuration stops a run. Every other failure is
//! recorded as a stage outcome and the server is launched regardless.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use server_manager::prelude::*;
//!
//! let raw = RawConfig::from_env();
//! let orchestrator = Orchestrator::new(
//!     Arc::new(TokioProcessRunner::new()),
//!     Arc::new(BlobConnector),
//! );
//! let mut report = orchestrator.execute(&raw).await?;
//! if let Some(server) = report.take_server() {
//!     server.wait().await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod manifest;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod render;
pub mod storage;
pub mod testing;

/// Name of the rendered map, both on disk and in the map container.
pub const MAP_OBJECT_NAME: &str = "map.jpg";

/// Name of the serialized manifest in the mod-list container.
pub const MODLIST_OBJECT_NAME: &str = "modlist.json";

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{RawConfig, ServerConfig, StorageSettings};
    pub use crate::core::{StageName, StageOutcome, StageStatus};
    pub use crate::errors::{ConfigError, ManifestError, ProcessError, StageError, StorageError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::manifest::{extract, parse_manifest, Manifest};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{Orchestrator, RetryConfig, RunReport, RunSummary};
    pub use crate::process::{
        CommandSpec, ConsoleMode, ManagedProcess, ProcessRunner, TokioProcessRunner,
    };
    pub use crate::render::ArtifactStager;
    pub use crate::storage::{
        BlobConnector, InMemoryObjectStore, ObjectHandle, ObjectStore, StorageSync, StoreConnector,
    };
}
