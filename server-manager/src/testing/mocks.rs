//! Scripted stand-ins for external processes.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::errors::ProcessError;
use crate::process::{CommandSpec, ExitOutcome, ManagedProcess, ProcessHandle, ProcessRunner};

/// What a scripted `run` call does.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    /// Exits with the given code and writes nothing.
    Exit(i32),
    /// Writes the bytes to the command's `--output=` path, then exits 0.
    WriteOutput(Vec<u8>),
    /// Fails to start.
    SpawnFailure,
    /// Runs past its timeout.
    TimedOut,
    /// Is interrupted: cancels the token, then reports the cancellation.
    Interrupt(Arc<CancellationToken>),
}

/// What a scripted `spawn` call does.
#[derive(Debug, Clone)]
pub enum ScriptedSpawn {
    /// Starts a process that exits with the given code when waited on.
    Exits(i32),
    /// Starts a process that never exits on its own.
    Runs,
    /// Fails to start.
    SpawnFailure,
}

/// A [`ProcessRunner`] that records every command and replays scripted results.
///
/// Once the scripts are exhausted, `run` exits 0 and `spawn` starts a process
/// that exits 0.
#[derive(Debug, Default)]
pub struct ScriptedProcessRunner {
    runs: Mutex<VecDeque<ScriptedRun>>,
    spawns: Mutex<VecDeque<ScriptedSpawn>>,
    run_calls: Mutex<Vec<CommandSpec>>,
    spawn_calls: Mutex<Vec<CommandSpec>>,
    next_pid: AtomicU32,
    last_killed: Mutex<Option<Arc<AtomicBool>>>,
}

impl ScriptedProcessRunner {
    /// Creates a runner with empty scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next `run`.
    #[must_use]
    pub fn on_run(self, run: ScriptedRun) -> Self {
        self.runs.lock().push_back(run);
        self
    }

    /// Queues the result of the next `spawn`.
    #[must_use]
    pub fn on_spawn(self, spawn: ScriptedSpawn) -> Self {
        self.spawns.lock().push_back(spawn);
        self
    }

    /// Commands passed to `run`, in order.
    #[must_use]
    pub fn run_calls(&self) -> Vec<CommandSpec> {
        self.run_calls.lock().clone()
    }

    /// Commands passed to `spawn`, in order.
    #[must_use]
    pub fn spawn_calls(&self) -> Vec<CommandSpec> {
        self.spawn_calls.lock().clone()
    }

    /// Total number of `run` and `spawn` calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.run_calls.lock().len() + self.spawn_calls.lock().len()
    }

    /// Whether the most recently spawned process has been killed.
    #[must_use]
    pub fn last_spawn_killed(&self) -> bool {
        self.last_killed
            .lock()
            .as_ref()
            .is_some_and(|k| k.load(Ordering::SeqCst))
    }
}

fn output_argument(command: &CommandSpec) -> Option<PathBuf> {
    command.args.iter().find_map(|arg| {
        arg.to_str()
            .and_then(|a| a.strip_prefix("--output="))
            .map(PathBuf::from)
    })
}

#[async_trait]
impl ProcessRunner for ScriptedProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ExitOutcome, ProcessError> {
        self.run_calls.lock().push(command.clone());
        let program = command.display_name();
        let scripted = self.runs.lock().pop_front().unwrap_or(ScriptedRun::Exit(0));

        match scripted {
            ScriptedRun::Exit(0) => Ok(ExitOutcome::ok(Duration::ZERO)),
            ScriptedRun::Exit(code) => Ok(ExitOutcome::failed(code, Duration::ZERO)),
            ScriptedRun::WriteOutput(bytes) => {
                if let Some(path) = output_argument(command) {
                    tokio::fs::write(&path, bytes)
                        .await
                        .map_err(|source| ProcessError::Wait { program, source })?;
                }
                Ok(ExitOutcome::ok(Duration::ZERO))
            }
            ScriptedRun::SpawnFailure => Err(ProcessError::Spawn {
                program,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            ScriptedRun::TimedOut => Err(ProcessError::TimedOut {
                program,
                timeout: command.timeout.unwrap_or_default(),
            }),
            ScriptedRun::Interrupt(token) => {
                token.cancel("interrupted");
                Err(ProcessError::Cancelled {
                    program,
                    reason: "interrupted".to_string(),
                })
            }
        }
    }

    async fn spawn(&self, command: &CommandSpec) -> Result<ManagedProcess, ProcessError> {
        self.spawn_calls.lock().push(command.clone());
        let program = command.display_name();
        let scripted = self
            .spawns
            .lock()
            .pop_front()
            .unwrap_or(ScriptedSpawn::Exits(0));

        let pid = 4_000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = match scripted {
            ScriptedSpawn::Exits(code) => SimulatedProcess::exiting(pid, code),
            ScriptedSpawn::Runs => SimulatedProcess::running(pid),
            ScriptedSpawn::SpawnFailure => {
                return Err(ProcessError::Spawn {
                    program,
                    source: std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "scripted spawn failure",
                    ),
                })
            }
        };
        *self.last_killed.lock() = Some(process.killed_flag());
        Ok(ManagedProcess::new(program, Box::new(process)))
    }
}

/// A [`ProcessHandle`] with no OS process behind it.
#[derive(Debug)]
pub struct SimulatedProcess {
    pid: u32,
    exit_code: Option<i32>,
    killed: Arc<AtomicBool>,
}

impl SimulatedProcess {
    /// A process that exits with `code` as soon as it is waited on.
    #[must_use]
    pub fn exiting(pid: u32, code: i32) -> Self {
        Self {
            pid,
            exit_code: Some(code),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A process that only ends when killed.
    #[must_use]
    pub fn running(pid: u32) -> Self {
        Self {
            pid,
            exit_code: None,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once the process is killed.
    #[must_use]
    pub fn killed_flag(&self) -> Arc<AtomicBool> {
        self.killed.clone()
    }
}

#[async_trait]
impl ProcessHandle for SimulatedProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        match self.exit_code {
            Some(0) => Ok(ExitOutcome::ok(Duration::ZERO)),
            Some(code) => Ok(ExitOutcome::failed(code, Duration::ZERO)),
            None => std::future::pending().await,
        }
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;

    #[tokio::test]
    async fn test_unscripted_calls_succeed_and_are_recorded() {
        let runner = ScriptedProcessRunner::new();

        let exit = runner.run(&CommandSpec::new("renderer")).await.unwrap();
        let process = runner.spawn(&CommandSpec::new("sh").arg("start.sh")).await.unwrap();

        assert!(exit.success);
        assert_eq!(process.pid(), Some(4_000));
        assert_eq!(runner.call_count(), 2);
        assert_eq!(runner.spawn_calls()[0].display_args(), vec!["start.sh"]);
    }

    #[tokio::test]
    async fn test_write_output_creates_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("map.jpg");
        let runner =
            ScriptedProcessRunner::new().on_run(ScriptedRun::WriteOutput(b"jpeg".to_vec()));

        let command = CommandSpec::new("renderer").arg(format!("--output={}", target.display()));
        runner.run(&command).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let runner = ScriptedProcessRunner::new()
            .on_run(ScriptedRun::SpawnFailure)
            .on_run(ScriptedRun::TimedOut)
            .on_spawn(ScriptedSpawn::SpawnFailure);

        let spawn_err = runner.run(&CommandSpec::new("renderer")).await.unwrap_err();
        let timeout_err = runner.run(&CommandSpec::new("renderer")).await.unwrap_err();
        let launch_err = runner.spawn(&CommandSpec::new("sh")).await.unwrap_err();

        assert!(spawn_err.is_spawn_failure());
        assert!(matches!(timeout_err, ProcessError::TimedOut { .. }));
        assert!(launch_err.is_spawn_failure());
    }

    #[tokio::test]
    async fn test_running_process_is_killed_on_cancellation() {
        let runner = ScriptedProcessRunner::new().on_spawn(ScriptedSpawn::Runs);
        let process = runner.spawn(&CommandSpec::new("sh")).await.unwrap();
        let token = CancellationToken::new();
        token.cancel("shutdown");

        let exit = process.supervise(&token).await.unwrap();

        assert!(exit.is_none());
        assert!(runner.last_spawn_killed());
    }
}
