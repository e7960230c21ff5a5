//! Run orchestration.
//!
//! This module provides:
//! - The [`Orchestrator`] that sequences a run
//! - [`RunReport`], the owned record of one run
//! - Retry policy for transient storage faults

mod orchestrator;
mod report;
mod retry;


pub use orchestrator::Orchestrator;
pub use report::{RunReport, RunSummary, EXIT_CONFIG_ERROR, EXIT_STAGE_FAILED, EXIT_SUCCESS};
pub use retry::{
    should_retry, with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision,
    RetryState,
};
