//! External process execution.
//!
//! This module provides:
//! - [`CommandSpec`], an argument-vector command description
//! - [`ProcessRunner`] for run-to-completion and long-running spawns
//! - [`ManagedProcess`], the owned handle of a long-running process

mod command;
mod managed;
mod runner;

pub use command::{CommandSpec, ConsoleMode, ExitOutcome, DEFAULT_SHUTDOWN_GRACE};
pub use managed::{ChildHandle, ManagedProcess, ProcessHandle};
pub use runner::{ProcessRunner, TokioProcessRunner};
