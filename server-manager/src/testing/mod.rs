//! Testing utilities for the pipeline.
//!
//! This module provides:
//! - A scripted process runner and simulated processes
//! - Configuration and document fixtures
//! - Assertions over stage outcomes

mod assertions;
mod fixtures;
mod mocks;

pub use crate::events::CollectingEventSink;
pub use assertions::{
    assert_detail_contains, assert_stage_order, assert_stage_status, assert_stage_succeeded,
};
pub use fixtures::{raw_config, raw_config_with_modlist, SAMPLE_MODLIST_HTML};
pub use mocks::{ScriptedProcessRunner, ScriptedRun, ScriptedSpawn, SimulatedProcess};
